use para_tranz_core::{search_strings, Project};

pub fn execute(project: &Project, pattern: &str) -> anyhow::Result<()> {
    let results = search_strings(project, pattern);
    for result in &results {
        println!("{result}");
    }
    println!("{} results", results.len());
    Ok(())
}
