// Map profile system
// Each profile pairs the application collections it serves with a map table

pub mod builtin;
pub mod custom;
pub mod registry;
pub mod traits;

pub use builtin::{
    BatteryStrength, DeclareProperty, DigitizerProfile, MouseProfile, PenProfile,
    SystemControlProfile,
};
pub use custom::{CustomEntry, CustomEvent, CustomProfile, LoadError};
pub use registry::{profile_registry, ProfileRegistry};
pub use traits::MapProfile;
