use kube::CustomResourceExt;
use node_maintenance_guard::crd::NodeMaintenance;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&NodeMaintenance::crd())?);
    Ok(())
}
