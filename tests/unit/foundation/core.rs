use super::*;

fn approx(a: Color, b: Color) -> bool {
    let (a, b) = (a.to_array(), b.to_array());
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9)
}

#[test]
fn over_with_opaque_source_replaces_destination() {
    let red = Color::rgba(1.0, 0.0, 0.0, 1.0);
    let blue = Color::rgba(0.0, 0.0, 1.0, 1.0);
    assert!(approx(red.over(blue), red));
}

#[test]
fn over_with_transparent_source_keeps_destination() {
    let blue = Color::rgba(0.0, 0.0, 1.0, 0.5);
    assert!(approx(Color::TRANSPARENT.over(blue), blue));
}

#[test]
fn over_half_alpha_mixes_channels() {
    let white_half = Color::rgba(1.0, 1.0, 1.0, 0.5);
    let black = Color::rgba(0.0, 0.0, 0.0, 1.0);
    assert!(approx(white_half.over(black), Color::rgba(0.5, 0.5, 0.5, 1.0)));
}

#[test]
fn hsv_primary_hues() {
    assert!(approx(Color::from_hsv(0.0, 1.0, 1.0), Color::rgba(1.0, 0.0, 0.0, 1.0)));
    assert!(approx(
        Color::from_hsv(1.0 / 3.0, 1.0, 1.0),
        Color::rgba(0.0, 1.0, 0.0, 1.0)
    ));
    assert!(approx(
        Color::from_hsv(2.0 / 3.0, 1.0, 1.0),
        Color::rgba(0.0, 0.0, 1.0, 1.0)
    ));
    // Hue wraps.
    assert!(approx(Color::from_hsv(1.0, 1.0, 1.0), Color::from_hsv(0.0, 1.0, 1.0)));
}

#[test]
fn serde_defaults_alpha_to_opaque() {
    let c: Color = serde_json::from_str(r#"{"r":0.1,"g":0.2,"b":0.3}"#).unwrap();
    assert_eq!(c.a, 1.0);
}
