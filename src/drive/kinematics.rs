// Mecanum inverse kinematics for a 4-wheel base
// Converts normalized body-frame commands (x, y, w) to per-wheel commands.
//
// Frame: x forward, y left, w counter-clockwise. Rollers form an X seen from above.

/// Behavioral flags applied before mixing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveFlags {
    /// Restrict translation to the dominant axis
    pub major_axis_only: bool,
    /// Reverse translation (the robot's "front" becomes its back)
    pub flipped: bool,
}

/// Wheel commands for the four motors
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelCommands {
    pub front_left: f32,
    pub front_right: f32,
    pub back_left: f32,
    pub back_right: f32,
}

impl WheelCommands {
    pub fn new(front_left: f32, front_right: f32, back_left: f32, back_right: f32) -> Self {
        Self {
            front_left,
            front_right,
            back_left,
            back_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns commands as array [front_left, front_right, back_left, back_right]
    pub fn as_array(&self) -> [f32; 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }

    fn from_array(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Clamp an input to the normalized range; non-finite input reads as zero
fn normalize_input(v: f32) -> f32 {
    if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Apply major-axis and flip flags to the translation components
fn shape_translation(mut x: f32, mut y: f32, flags: DriveFlags) -> (f32, f32) {
    if flags.major_axis_only {
        // Ties zero x
        if x.abs() > y.abs() {
            y = 0.0;
        } else {
            x = 0.0;
        }
    }

    if flags.flipped {
        x = -x;
        y = -y;
    }

    (x, y)
}

/// Cartesian mixing law, one row per wheel: [x, y, w] coefficients
fn mix(x: f32, y: f32, w: f32) -> [f32; 4] {
    [
        x - y - w, // front left
        x + y + w, // front right
        x + y - w, // back left
        x - y + w, // back right
    ]
}

/// Convert a body command to wheel commands scaled to `ceiling`
///
/// # Arguments
/// * `x` - Forward command in [-1, 1] (positive = forward)
/// * `y` - Strafe command in [-1, 1] (positive = left)
/// * `w` - Rotation command in [-1, 1] (positive = counter-clockwise)
/// * `flags` - Major-axis and flip behavior
/// * `ceiling` - Output ceiling (1.0 open-loop, physical setpoint ceiling closed-loop)
///
/// If any mixed value exceeds unit magnitude, all four are scaled by the same
/// factor so the relative mix is preserved. The largest magnitude then equals
/// `ceiling`.
pub fn mecanum_mix(x: f32, y: f32, w: f32, flags: DriveFlags, ceiling: f32) -> WheelCommands {
    let (x, y) = shape_translation(normalize_input(x), normalize_input(y), flags);
    let mut wheels = mix(x, y, normalize_input(w));

    let max_abs = wheels.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    if max_abs > 1.0 {
        for v in &mut wheels {
            *v /= max_abs;
        }
    }

    WheelCommands::from_array(wheels.map(|v| v * ceiling))
}
