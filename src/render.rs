//! Bounding-box annotation for observability.
//!
//! Boxes and `<Role> <pct>` captions are drawn into the frame buffer for every
//! resolved detection; UNKNOWN detections are left undrawn. Captions use a
//! built-in 3x5 font (upper case, digits, space). Nothing here feeds back into
//! the policy.

use crate::detect::{ClassRole, DetectionBatch};
use crate::frame::Frame;

const BOX_THICKNESS: u32 = 2;
const GLYPH_COLS: u32 = 3;
const GLYPH_ROWS: u32 = 5;
const GLYPH_SCALE: u32 = 2;
/// Horizontal advance per character, including spacing.
const GLYPH_ADVANCE: u32 = (GLYPH_COLS + 1) * GLYPH_SCALE;
const CAPTION_HEIGHT: u32 = GLYPH_ROWS * GLYPH_SCALE;
const CAPTION_GAP: u32 = 2;

/// Box color (RGB) for a role; `None` for roles that are not drawn.
pub fn role_color(role: ClassRole) -> Option<[u8; 3]> {
    match role {
        ClassRole::Fire => Some([255, 0, 0]),
        ClassRole::Smoke => Some([255, 165, 0]),
        ClassRole::Thermal => Some([0, 0, 255]),
        ClassRole::Unknown => None,
    }
}

/// One drawn box and its caption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub label: String,
    pub color: [u8; 3],
    pub rect: (u32, u32, u32, u32),
}

/// Draw every resolved detection in `batch` onto `frame`.
pub fn annotate(frame: &mut Frame, batch: &DetectionBatch) -> Vec<Annotation> {
    let mut drawn = Vec::new();
    if frame.width() == 0 || frame.height() == 0 {
        return drawn;
    }
    for detection in batch.iter() {
        let Some(color) = role_color(detection.class_role()) else {
            continue;
        };
        let bbox = detection.bbox();
        let max_x = (frame.width() - 1) as f32;
        let max_y = (frame.height() - 1) as f32;
        let x1 = bbox.x1.clamp(0.0, max_x) as u32;
        let y1 = bbox.y1.clamp(0.0, max_y) as u32;
        let x2 = bbox.x2.clamp(0.0, max_x) as u32;
        let y2 = bbox.y2.clamp(0.0, max_y) as u32;
        if x2 < x1 || y2 < y1 {
            continue;
        }
        let label = format!(
            "{} {}",
            detection.class_role().display_name(),
            detection.confidence_percent()
        );
        draw_rect(frame, (x1, y1, x2, y2), color);
        draw_caption(frame, &label, (x1, y1), color);
        drawn.push(Annotation {
            label,
            color,
            rect: (x1, y1, x2, y2),
        });
    }
    drawn
}

fn draw_rect(frame: &mut Frame, (x1, y1, x2, y2): (u32, u32, u32, u32), color: [u8; 3]) {
    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            frame.put_pixel(x, y1 + t, color);
            frame.put_pixel(x, y2.saturating_sub(t), color);
        }
        for y in y1..=y2 {
            frame.put_pixel(x1 + t, y, color);
            frame.put_pixel(x2.saturating_sub(t), y, color);
        }
    }
}

/// Caption above the box, or just inside its top edge when there is no room.
/// Shifted left and up as needed to stay inside the frame.
fn draw_caption(frame: &mut Frame, text: &str, (x1, y1): (u32, u32), color: [u8; 3]) {
    let width = text.chars().count() as u32 * GLYPH_ADVANCE;
    let x = x1.min(frame.width().saturating_sub(width));
    let y = if y1 >= CAPTION_HEIGHT + CAPTION_GAP {
        y1 - CAPTION_GAP - CAPTION_HEIGHT
    } else {
        y1 + BOX_THICKNESS + 1
    };
    let y = y.min(frame.height().saturating_sub(CAPTION_HEIGHT));

    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let origin_x = x + i as u32 * GLYPH_ADVANCE;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        frame.put_pixel(
                            origin_x + col * GLYPH_SCALE + dx,
                            y + row as u32 * GLYPH_SCALE + dy,
                            color,
                        );
                    }
                }
            }
        }
    }
}

/// Rows of a 3x5 glyph, most significant of the three bits on the left.
fn glyph(ch: char) -> Option<[u8; 5]> {
    let rows = match ch.to_ascii_uppercase() {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'E' => [0b111, 0b100, 0b111, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b111, 0b100, 0b100],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        _ => return None,
    };
    Some(rows)
}
