use para_tranz_core::{generate_class_mapping, Project, StringStatus};

pub fn generate(project: &Project, class: &str) -> anyhow::Result<()> {
    let generated = generate_class_mapping(project, class)?;

    println!("Class found in {}:", generated.jar_path);
    println!("{}", serde_json::to_string_pretty(&generated.generated)?);
    match &generated.existing {
        Some(existing) => {
            println!("Existing mapping:");
            println!("{}", serde_json::to_string_pretty(existing)?);
        }
        None => println!("The class is not in the mapping yet"),
    }

    println!("Strings:");
    for (string, status, shared) in generated.comparison() {
        let status = match status {
            StringStatus::Included => "included",
            StringStatus::Excluded => "excluded",
            StringStatus::New => "new",
        };
        let shared = if shared { " (class or member name, not writable)" } else { "" };
        println!("\t[{status}] \"{string}\"{shared}");
    }
    Ok(())
}

pub fn dedup(project: &mut Project) -> anyhow::Result<()> {
    let merged = project.mapping.dedup_and_sort();
    let path = project.config.mapping_file();
    project.mapping.save(&path)?;
    println!("✓ Merged {merged} duplicate class entries in {}", path.display());
    Ok(())
}
