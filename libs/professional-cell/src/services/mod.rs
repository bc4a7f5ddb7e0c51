pub mod availability;
pub mod directory;

pub use availability::AvailabilitySource;
pub use directory::ProfessionalDirectory;
