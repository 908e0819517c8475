// Wheel-level math for the four-wheel skid-steer base
//
// Provides:
// - Per-wheel vectors in canonical wheel order
// - Skid-steer kinematics (body twist <-> wheel speeds)
// - Per-wheel acceleration limiting

pub mod kinematics;
mod limiter;
mod wheels;

pub use kinematics::{twist_to_wheels, wheels_to_twist, Twist};
pub use limiter::AccelerationLimiter;
pub use wheels::{Wheel, WheelVector};
