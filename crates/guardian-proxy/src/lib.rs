pub mod command_approver;
pub mod domain_approver;
pub mod error;
mod metrics;
pub mod proxy;
pub mod reload;

pub use command_approver::CommandApprover;
pub use domain_approver::{validate_domain, DomainApprover};
pub use error::{Error, Result};
pub use proxy::{is_cgnat, is_private_or_loopback, is_ula, GuardianProxy, ProxyConfig};
pub use reload::{ControllerNotifier, ReloadController};
