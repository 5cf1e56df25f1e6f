mod events;
mod service;

pub use events::ProgressEvent;
pub use service::ProgressService;
