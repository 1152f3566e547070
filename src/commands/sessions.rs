use anyhow::Result;

use crate::session::InstanceStorage;
use crate::utils::truncate_str;

/// Print the stored instances, one per line.
pub async fn execute() -> Result<()> {
    let storage = InstanceStorage::new(InstanceStorage::default_dir());
    let instances = storage.load_instances().await;

    if instances.is_empty() {
        println!("No stored instances.");
        return Ok(());
    }

    println!("{:>4}  {:<26} {:<30} {}", "ID", "TITLE", "BRANCH", "STATUS");
    for instance in &instances {
        println!(
            "{:>4}  {:<26} {:<30} {}",
            instance.id,
            truncate_str(&instance.title, 26),
            truncate_str(&instance.branch, 30),
            instance.status.label()
        );
    }
    Ok(())
}
