use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detection::domain::face::Face;
use crate::overlay::font;
use crate::overlay::surface::Surface;

const BOX_COLOR: Rgba<u8> = Rgba([0xFF, 0x52, 0x52, 0xFF]);
const BOX_STROKE: i32 = 3;

const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_BG: Rgba<u8> = Rgba([0, 0, 0, 178]);
const LABEL_BAND_HEIGHT: u32 = 18;
const LABEL_PAD: i32 = 4;
const ICON_SIZE: u32 = 12;

const PANEL_BG: Rgba<u8> = Rgba([0, 0, 0, 178]);
const PANEL_MAX_WIDTH: u32 = 200;
const PANEL_MAX_ENTRIES: usize = 5;
const PANEL_TITLE_HEIGHT: u32 = 16;
const PANEL_ROW_HEIGHT: u32 = 14;
const PANEL_LABEL_COL: u32 = 64;
const PANEL_PCT_COL: u32 = 52;
const PANEL_MIN_BAR: u32 = 24;
const BAR_BG: Rgba<u8> = Rgba([0x33, 0x33, 0x33, 0xFF]);

/// Draws detection annotations onto the surface, mapping source-frame
/// coordinates to the surface's pixel size.
///
/// The surface is cleared first, unconditionally: a result with fewer (or
/// zero) faces must never leave stale annotations from an earlier frame.
///
/// Scale factors are computed independently per axis. When CSS-style
/// letterboxing gives the surface a different aspect ratio than the source,
/// boxes stretch by the same amounts the displayed media does; this is an
/// accepted approximation, not a bug.
pub fn render(surface: &mut Surface, faces: &[Face], source_width: u32, source_height: u32) {
    surface.clear();
    if faces.is_empty() {
        return;
    }
    if source_width == 0 || source_height == 0 || surface.width() == 0 || surface.height() == 0 {
        return;
    }

    let scale_x = surface.width() as f32 / source_width as f32;
    let scale_y = surface.height() as f32 / source_height as f32;
    log::debug!(
        "rendering {} face(s): source {source_width}x{source_height}, scale {scale_x:.3}x{scale_y:.3}",
        faces.len()
    );

    let image = surface.pixels_mut();
    for face in faces {
        draw_face(
            image,
            face,
            face.bbox.x * scale_x,
            face.bbox.y * scale_y,
            face.bbox.width * scale_x,
            face.bbox.height * scale_y,
        );
    }
}

fn draw_face(image: &mut RgbaImage, face: &Face, x: f32, y: f32, width: f32, height: f32) {
    let ix = x.round() as i32;
    let iy = y.round() as i32;
    let iw = width.round().max(1.0) as u32;
    let ih = height.round().max(1.0) as u32;

    stroke_rect(image, ix, iy, iw, ih);
    draw_label_band(image, face, ix, iy, iw);
    if face.emotions.len() > 1 {
        draw_emotion_panel(image, &face.emotions, ix, iy + ih as i32, iw);
    }
}

fn stroke_rect(image: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32) {
    for inset in 0..BOX_STROKE {
        let w = width as i64 - 2 * inset as i64;
        let h = height as i64 - 2 * inset as i64;
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(x + inset, y + inset).of_size(w as u32, h as u32),
            BOX_COLOR,
        );
    }
}

/// Filled band anchored to the box's top edge: label text on the left,
/// emotion marker on the right. Widens past the box when the text needs it.
fn draw_label_band(image: &mut RgbaImage, face: &Face, x: i32, y: i32, box_width: u32) {
    let label = face.label();
    let content = font::text_width(&label) + ICON_SIZE + 3 * LABEL_PAD as u32;
    let band_width = box_width.max(content);
    let band_y = y - LABEL_BAND_HEIGHT as i32;

    fill_rect(image, x, band_y, band_width, LABEL_BAND_HEIGHT, LABEL_BG);
    font::draw_text(image, &label, x + LABEL_PAD, band_y + 3, TEXT_COLOR);

    let dominant = face
        .dominant_emotion()
        .map(|(l, _)| l.to_string())
        .or_else(|| face.emotion.clone());
    let icon_x = x + band_width as i32 - ICON_SIZE as i32 - LABEL_PAD;
    draw_icon(
        image,
        EmotionIcon::for_label(dominant.as_deref()),
        dominant.as_deref(),
        icon_x,
        band_y + 3,
    );
}

/// Ranked detail panel below the box: top entries of the distribution as
/// labeled horizontal bars, fill length proportional to confidence.
fn draw_emotion_panel(
    image: &mut RgbaImage,
    emotions: &[(String, f32)],
    x: i32,
    y: i32,
    box_width: u32,
) {
    let mut ranked: Vec<&(String, f32)> = emotions.iter().collect();
    // Stable sort: equal confidences keep wire order.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(PANEL_MAX_ENTRIES);

    let width = box_width
        .max(PANEL_LABEL_COL + PANEL_PCT_COL + PANEL_MIN_BAR)
        .min(PANEL_MAX_WIDTH);
    let height = PANEL_TITLE_HEIGHT + ranked.len() as u32 * PANEL_ROW_HEIGHT + 4;
    fill_rect(image, x, y, width, height, PANEL_BG);
    font::draw_text(image, "emotions:", x + LABEL_PAD, y + 2, TEXT_COLOR);

    for (i, entry) in ranked.into_iter().enumerate() {
        let (label, confidence) = (&entry.0, entry.1);
        let row_y = y + PANEL_TITLE_HEIGHT as i32 + i as i32 * PANEL_ROW_HEIGHT as i32;

        let short: String = label.chars().take(7).collect();
        font::draw_text(image, &short, x + LABEL_PAD, row_y, TEXT_COLOR);

        let pct_text = format!("{:.1}%", confidence * 100.0);
        let pct_x = x + width as i32 - font::text_width(&pct_text) as i32 - LABEL_PAD;
        font::draw_text(image, &pct_text, pct_x, row_y, TEXT_COLOR);

        let bar_span = width.saturating_sub(PANEL_LABEL_COL + PANEL_PCT_COL);
        if bar_span == 0 {
            continue;
        }
        let bar_x = x + PANEL_LABEL_COL as i32;
        let fill = (confidence.clamp(0.0, 1.0) * bar_span as f32).round() as u32;
        fill_rect(image, bar_x, row_y + 3, bar_span, 6, BAR_BG);
        fill_rect(image, bar_x, row_y + 3, fill, 6, emotion_color(label));
    }
}

fn fill_rect(image: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
    if width == 0 || height == 0 {
        return;
    }
    draw_filled_rect_mut(image, Rect::at(x, y).of_size(width, height), color);
}

/// Fixed label→color palette for distribution bars and icon tinting.
/// Unmapped labels get the accent fallback, never an error.
pub fn emotion_color(label: &str) -> Rgba<u8> {
    match label.to_ascii_lowercase().as_str() {
        "anger" | "angry" => Rgba([0xFF, 0x52, 0x52, 0xFF]),
        "disgust" | "disgusted" => Rgba([0x8B, 0xC3, 0x4A, 0xFF]),
        "fear" | "fearful" => Rgba([0xFF, 0x98, 0x00, 0xFF]),
        "happy" | "happiness" => Rgba([0x4C, 0xAF, 0x50, 0xFF]),
        "sad" | "sadness" => Rgba([0x21, 0x96, 0xF3, 0xFF]),
        "surprise" | "surprised" => Rgba([0x9C, 0x27, 0xB0, 0xFF]),
        "neutral" => Rgba([0x75, 0x75, 0x75, 0xFF]),
        _ => Rgba([0x4A, 0x6E, 0xE0, 0xFF]),
    }
}

/// Fixed label→icon mapping for the marker in the label band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmotionIcon {
    Happy,
    Sad,
    Angry,
    Disgust,
    Fear,
    Surprise,
    Neutral,
    Plain,
}

impl EmotionIcon {
    /// Case-insensitive; unknown labels (and no label at all) map to the
    /// default icon, never to an error.
    pub fn for_label(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return EmotionIcon::Plain;
        };
        match label.to_ascii_lowercase().as_str() {
            "happy" | "happiness" => EmotionIcon::Happy,
            "sad" | "sadness" => EmotionIcon::Sad,
            "anger" | "angry" => EmotionIcon::Angry,
            "disgust" | "disgusted" => EmotionIcon::Disgust,
            "fear" | "fearful" => EmotionIcon::Fear,
            "surprise" | "surprised" => EmotionIcon::Surprise,
            "neutral" => EmotionIcon::Neutral,
            _ => EmotionIcon::Plain,
        }
    }

    /// 12x12 row masks, bit 11 = leftmost column: an outlined face with a
    /// per-emotion mouth (and brows for anger).
    fn pattern(self) -> [u16; 12] {
        let mut rows: [u16; 12] = [
            0x1F8, 0x204, 0x402, 0x801, 0x801, 0x801, 0x801, 0x801, 0x402, 0x204, 0x1F8, 0x000,
        ];
        rows[3] |= 0x108; // eyes
        match self {
            EmotionIcon::Happy => {
                rows[6] |= 0x204;
                rows[7] |= 0x1F8;
            }
            EmotionIcon::Sad => {
                rows[6] |= 0x1F8;
                rows[7] |= 0x204;
            }
            EmotionIcon::Angry => {
                rows[2] |= 0x108;
                rows[6] |= 0x1F8;
                rows[7] |= 0x204;
            }
            EmotionIcon::Disgust => {
                rows[7] |= 0x150;
            }
            EmotionIcon::Fear => {
                rows[6] |= 0x0F0;
                rows[7] |= 0x0F0;
                rows[8] |= 0x0F0;
            }
            EmotionIcon::Surprise => {
                rows[6] |= 0x060;
                rows[7] |= 0x090;
                rows[8] |= 0x060;
            }
            EmotionIcon::Neutral => {
                rows[7] |= 0x1F8;
            }
            EmotionIcon::Plain => {
                rows[6] |= 0x1F8;
                rows[7] |= 0x1F8;
            }
        }
        rows
    }
}

fn draw_icon(image: &mut RgbaImage, icon: EmotionIcon, label: Option<&str>, x: i32, y: i32) {
    let color = emotion_color(label.unwrap_or(""));
    for (row, bits) in icon.pattern().iter().enumerate() {
        for col in 0..ICON_SIZE {
            if (bits >> (11 - col)) & 1 == 1 {
                font::put_pixel_clipped(image, x + col as i32, y + row as i32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face::FaceBox;
    use rstest::rstest;

    fn face(x: f32, y: f32, w: f32, h: f32) -> Face {
        Face::new(FaceBox::new(x, y, w, h))
    }

    fn happy_face(x: f32, y: f32, w: f32, h: f32, score: f32) -> Face {
        Face {
            emotion: Some("happy".to_string()),
            score: Some(score),
            ..face(x, y, w, h)
        }
    }

    // ── Clearing ─────────────────────────────────────────────────────

    #[test]
    fn test_empty_faces_leaves_surface_fully_cleared() {
        let mut surface = Surface::new(100, 100);
        render(&mut surface, &[face(10.0, 10.0, 30.0, 30.0)], 100, 100);
        assert!(!surface.is_clear());

        render(&mut surface, &[], 100, 100);
        assert!(surface.is_clear());
    }

    #[test]
    fn test_rerender_replaces_previous_annotations() {
        let mut surface = Surface::new(100, 100);
        render(&mut surface, &[face(60.0, 60.0, 30.0, 30.0)], 100, 100);
        render(&mut surface, &[face(5.0, 30.0, 20.0, 20.0)], 100, 100);
        // Old box's bottom-right corner must be gone.
        assert_eq!(surface.pixel(89, 89).0[3], 0);
        assert_eq!(surface.pixel(5, 30), BOX_COLOR);
    }

    #[test]
    fn test_zero_source_dimensions_draw_nothing() {
        let mut surface = Surface::new(100, 100);
        render(&mut surface, &[face(10.0, 10.0, 30.0, 30.0)], 0, 100);
        assert!(surface.is_clear());
        render(&mut surface, &[face(10.0, 10.0, 30.0, 30.0)], 100, 0);
        assert!(surface.is_clear());
    }

    // ── Coordinate transform ─────────────────────────────────────────

    #[test]
    fn test_non_uniform_scaling_is_exact() {
        // Surface 2x horizontally, 3x vertically.
        let mut surface = Surface::new(200, 300);
        render(&mut surface, &[face(5.0, 7.0, 11.0, 13.0)], 100, 100);

        // Expected rect: (10, 21) size (22, 39).
        assert_eq!(surface.pixel(10, 21), BOX_COLOR);
        assert_eq!(surface.pixel(31, 59), BOX_COLOR);
        // One pixel left of the box is outside both box and band.
        assert_eq!(surface.pixel(9, 21).0[3], 0);
        // Just past the bottom-right corner.
        assert_eq!(surface.pixel(32, 60).0[3], 0);
    }

    #[test]
    fn test_twice_native_resolution_end_to_end_geometry() {
        // The canonical case: source 320x240 shown at 640x480.
        let mut surface = Surface::new(640, 480);
        let f = happy_face(10.0, 20.0, 100.0, 50.0, 0.87);
        assert_eq!(f.label(), "happy 87%");
        render(&mut surface, &[f], 320, 240);

        assert_eq!(surface.pixel(20, 40), BOX_COLOR);
        assert_eq!(surface.pixel(219, 139), BOX_COLOR);
        // Interior stays unfilled.
        assert_eq!(surface.pixel(120, 90).0[3], 0);
        // Label band sits directly above the box.
        assert_eq!(surface.pixel(21, 23), LABEL_BG);
    }

    #[test]
    fn test_downscaled_surface() {
        // Surface half the source size.
        let mut surface = Surface::new(50, 50);
        render(&mut surface, &[face(10.0, 10.0, 40.0, 40.0)], 100, 100);
        assert_eq!(surface.pixel(5, 5), BOX_COLOR);
        assert_eq!(surface.pixel(24, 24), BOX_COLOR);
    }

    #[test]
    fn test_box_partially_off_surface_is_clipped() {
        let mut surface = Surface::new(50, 50);
        render(&mut surface, &[face(40.0, 40.0, 30.0, 30.0)], 50, 50);
        // No panic; visible edge drawn.
        assert_eq!(surface.pixel(40, 45), BOX_COLOR);
    }

    // ── Detail panel ─────────────────────────────────────────────────

    fn distribution_face() -> Face {
        Face {
            emotions: vec![
                ("happy".to_string(), 0.6),
                ("sad".to_string(), 0.3),
                ("neutral".to_string(), 0.1),
            ],
            ..face(10.0, 30.0, 100.0, 40.0)
        }
    }

    #[test]
    fn test_distribution_renders_panel_below_box() {
        let mut surface = Surface::new(300, 300);
        render(&mut surface, &[distribution_face()], 300, 300);
        // Panel background starts at the box's bottom edge (y = 30 + 40).
        assert_eq!(surface.pixel(12, 72), PANEL_BG);
    }

    #[test]
    fn test_single_entry_distribution_has_no_panel() {
        let mut surface = Surface::new(300, 300);
        let f = Face {
            emotions: vec![("happy".to_string(), 0.9)],
            ..face(10.0, 30.0, 100.0, 40.0)
        };
        render(&mut surface, &[f], 300, 300);
        assert_eq!(surface.pixel(12, 72).0[3], 0);
    }

    #[test]
    fn test_panel_bar_fill_uses_palette_color() {
        let mut surface = Surface::new(300, 300);
        render(&mut surface, &[distribution_face()], 300, 300);
        // First ranked row is "happy"; its bar starts at x + PANEL_LABEL_COL.
        let bar_x = 10 + PANEL_LABEL_COL;
        let row_y = 70 + PANEL_TITLE_HEIGHT + 3;
        assert_eq!(surface.pixel(bar_x + 1, row_y + 1), emotion_color("happy"));
    }

    // ── Palette and icons ────────────────────────────────────────────

    #[rstest]
    #[case("anger", "angry")]
    #[case("disgust", "disgusted")]
    #[case("fear", "fearful")]
    #[case("happy", "happiness")]
    #[case("sad", "sadness")]
    #[case("surprise", "surprised")]
    fn test_palette_covers_label_synonyms(#[case] a: &str, #[case] b: &str) {
        assert_eq!(emotion_color(a), emotion_color(b));
        assert_ne!(emotion_color(a), emotion_color("something else"));
    }

    #[test]
    fn test_palette_fallback_for_unknown_label() {
        assert_eq!(emotion_color("perplexed"), Rgba([0x4A, 0x6E, 0xE0, 0xFF]));
    }

    #[rstest]
    #[case(Some("HAPPY"), EmotionIcon::Happy)]
    #[case(Some("Sadness"), EmotionIcon::Sad)]
    #[case(Some("angry"), EmotionIcon::Angry)]
    #[case(Some("neutral"), EmotionIcon::Neutral)]
    #[case(Some("zzz-unknown"), EmotionIcon::Plain)]
    #[case(None, EmotionIcon::Plain)]
    fn test_icon_mapping(#[case] label: Option<&str>, #[case] expected: EmotionIcon) {
        assert_eq!(EmotionIcon::for_label(label), expected);
    }

    #[test]
    fn test_icon_patterns_are_distinct() {
        let icons = [
            EmotionIcon::Happy,
            EmotionIcon::Sad,
            EmotionIcon::Angry,
            EmotionIcon::Disgust,
            EmotionIcon::Fear,
            EmotionIcon::Surprise,
            EmotionIcon::Neutral,
            EmotionIcon::Plain,
        ];
        for (i, a) in icons.iter().enumerate() {
            for b in &icons[i + 1..] {
                assert_ne!(a.pattern(), b.pattern(), "{a:?} vs {b:?}");
            }
        }
    }
}
