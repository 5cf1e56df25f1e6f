#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress;
pub mod tutor_service;

pub use academy_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressServiceError};
pub use progress::{ProgressEvent, ProgressService};
pub use tutor_service::TutorService;
