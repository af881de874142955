//! Extension name constants

pub const OMI_PHYSICS_SHAPE: &str = "OMI_physics_shape";
pub const OMI_PHYSICS_BODY: &str = "OMI_physics_body";
pub const OMI_PHYSICS_JOINT: &str = "OMI_physics_joint";
pub const OMI_PHYSICS_GRAVITY: &str = "OMI_physics_gravity";
pub const OMI_SPAWN_POINT: &str = "OMI_spawn_point";
pub const OMI_SEAT: &str = "OMI_seat";
pub const OMI_LINK: &str = "OMI_link";
pub const KHR_AUDIO_EMITTER: &str = "KHR_audio_emitter";
pub const OMI_VEHICLE_BODY: &str = "OMI_vehicle_body";
pub const OMI_VEHICLE_WHEEL: &str = "OMI_vehicle_wheel";
pub const OMI_VEHICLE_THRUSTER: &str = "OMI_vehicle_thruster";
pub const OMI_VEHICLE_HOVER_THRUSTER: &str = "OMI_vehicle_hover_thruster";
pub const OMI_ENVIRONMENT_SKY: &str = "OMI_environment_sky";

/// Every name above
pub const KNOWN: &[&str] = &[
    OMI_PHYSICS_SHAPE,
    OMI_PHYSICS_BODY,
    OMI_PHYSICS_JOINT,
    OMI_PHYSICS_GRAVITY,
    OMI_SPAWN_POINT,
    OMI_SEAT,
    OMI_LINK,
    KHR_AUDIO_EMITTER,
    OMI_VEHICLE_BODY,
    OMI_VEHICLE_WHEEL,
    OMI_VEHICLE_THRUSTER,
    OMI_VEHICLE_HOVER_THRUSTER,
    OMI_ENVIRONMENT_SKY,
];

/// Check if `name` is one of the extensions in [`KNOWN`]
pub fn is_known(name: &str) -> bool {
    KNOWN.contains(&name)
}
