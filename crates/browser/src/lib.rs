pub mod cdp;
pub mod extract;
pub mod launch;
pub mod registry;

pub use cdp::CdpClient;
pub use registry::{PageRef, SessionBrief, SessionRegistry, DEFAULT_PAGE_ID};
