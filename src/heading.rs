/// Compass bearing in degrees for the horizontal field components.
///
/// Zero lies on the positive x-axis and angles grow counter-clockwise; negative
/// results of `atan2` are shifted by a full turn. `(0, 0)` maps to 0.
pub fn heading(x: f64, y: f64) -> f64 {
    let mut degrees = y.atan2(x).to_degrees();
    if degrees < 0.0 {
        degrees += 360.0;
    }
    // -1e-15 + 360.0 rounds up to a full turn
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}
