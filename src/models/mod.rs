mod instance;
mod pr;

pub use instance::{Instance, InstanceId, InstanceStatus};
pub use pr::{PrComment, PullRequest};
