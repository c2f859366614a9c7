use para_tranz_core::Project;

pub fn execute(project: &mut Project, migrate: bool) -> anyhow::Result<()> {
    println!("Importing from {}", project.config.platform_root().display());
    let report = project.import_all(migrate)?;
    println!(
        "✓ {} updated, {} skipped, {} unmatched; {} of {} files rewritten",
        report.summary.updated,
        report.summary.skipped,
        report.summary.unmatched,
        report.rewritten,
        report.files
    );
    if report.mapping_changes > 0 {
        println!(
            "Mapping learned {} migrated classes: {}",
            report.mapping_changes,
            project.config.mapping_file().display()
        );
    }
    if report.failed > 0 {
        anyhow::bail!("{} files failed to import", report.failed);
    }
    Ok(())
}
