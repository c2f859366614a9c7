use para_tranz_core::Project;

pub fn execute(project: &Project) -> anyhow::Result<()> {
    println!("Exporting to {}", project.config.platform_root().display());
    let report = project.export_all();
    println!(
        "✓ Exported {} entries from {} files",
        report.exported, report.files
    );
    if report.failed > 0 {
        anyhow::bail!("{} files failed to export", report.failed);
    }
    Ok(())
}
