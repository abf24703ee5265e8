pub mod hazard;
pub mod position;
pub mod subscription;
pub mod vehicle;

pub use hazard::{HazardKind, HazardReport, Severity, SosEvent};
pub use position::{validate, FieldError, Position, RawPositionUpdate};
pub use subscription::Room;
pub use vehicle::{VehicleDescriptor, VehicleStatus};
