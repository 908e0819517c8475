// Skid-steer kinematics for the four-wheel base
// Both wheels on a side share a speed; wheel speeds are angular (rad/s).

use super::wheels::{Wheel, WheelVector};

/// Body-frame velocity: forward m/s and yaw rate rad/s (positive = counter-clockwise)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub linear: f64,
    pub angular: f64,
}

/// Convert a body twist to wheel speeds
///
/// # Arguments
/// * `linear` - Forward velocity in m/s
/// * `angular` - Yaw rate in rad/s
/// * `width` - Track width in meters
/// * `radius` - Wheel radius in meters
pub fn twist_to_wheels(linear: f64, angular: f64, width: f64, radius: f64) -> WheelVector {
    let left = (linear - angular * width / 2.0) / radius;
    let right = (linear + angular * width / 2.0) / radius;
    WheelVector::new(left, right, left, right)
}

/// Estimate the body twist from measured wheel speeds, averaging each side
pub fn wheels_to_twist(wheels: &WheelVector, width: f64, radius: f64) -> Twist {
    let left = (wheels[Wheel::FrontLeft] + wheels[Wheel::RearLeft]) / 2.0 * radius;
    let right = (wheels[Wheel::FrontRight] + wheels[Wheel::RearRight]) / 2.0 * radius;
    Twist {
        linear: (left + right) / 2.0,
        angular: (right - left) / width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: f64 = 1.01;
    const RADIUS: f64 = 0.333;

    #[test]
    fn test_zero_velocity() {
        let wheels = twist_to_wheels(0.0, 0.0, WIDTH, RADIUS);
        assert!(wheels.is_stationary(0.0));
    }

    #[test]
    fn test_forward_motion() {
        // Straight ahead: all four wheels spin together
        let wheels = twist_to_wheels(1.0, 0.0, WIDTH, RADIUS);
        let expected = 1.0 / RADIUS;
        for w in Wheel::ALL {
            assert!((wheels[w] - expected).abs() < 1e-9, "{} wheel off", w);
        }
    }

    #[test]
    fn test_rotation_only() {
        // Turning in place: sides spin in opposite directions, left backwards for ccw
        let wheels = twist_to_wheels(0.0, 1.0, WIDTH, RADIUS);
        assert!(wheels[Wheel::FrontLeft] < 0.0 && wheels[Wheel::RearLeft] < 0.0);
        assert!(wheels[Wheel::FrontRight] > 0.0 && wheels[Wheel::RearRight] > 0.0);
        assert!((wheels[Wheel::FrontLeft] + wheels[Wheel::FrontRight]).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_recovers_twist() {
        let wheels = twist_to_wheels(0.7, -0.4, WIDTH, RADIUS);
        let twist = wheels_to_twist(&wheels, WIDTH, RADIUS);
        assert!((twist.linear - 0.7).abs() < 1e-9);
        assert!((twist.angular + 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_averages_each_side() {
        // A slipping front-left wheel only pulls the left side average
        let wheels = WheelVector::new(0.0, 2.0, 2.0, 2.0);
        let twist = wheels_to_twist(&wheels, WIDTH, RADIUS);
        assert!((twist.linear - 1.5 * RADIUS).abs() < 1e-9);
        assert!(twist.angular > 0.0);
    }
}
