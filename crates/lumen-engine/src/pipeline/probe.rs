//! Pixel verification for probe commands.

use crate::png::{encode_png, EncodeError};
use crate::value::ScalarValue;

use super::command::ProbeCommand;

/// Rectangle of the frame that was read back.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProbeRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A failed probe: where it first failed, how much failed, and the actual
/// pixels as a PNG.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "probe at ({x}, {y}) failed: expected {:#010x}, observed {:#010x} ({mismatched} of {total} pixels differ)",
    .expected.as_u32(),
    .observed.as_u32()
)]
pub struct VerificationMismatch {
    /// Frame coordinates of the first mismatching pixel.
    pub x: u32,
    pub y: u32,
    pub expected: ScalarValue,
    pub observed: ScalarValue,
    pub mismatched: usize,
    pub total: usize,
    /// PNG of the probed rectangle as rendered.
    pub image: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Pass,
    Mismatch(VerificationMismatch),
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub rect: ProbeRect,
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    #[inline]
    pub fn passed(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Pass)
    }

    /// Encoded PNG of the probed rectangle, present only on failure.
    pub fn diagnostic_image(&self) -> Option<&[u8]> {
        match &self.outcome {
            ProbeOutcome::Pass => None,
            ProbeOutcome::Mismatch(m) => Some(&m.image),
        }
    }

    /// Escalates a mismatch into an error for callers that treat it as fatal.
    pub fn into_result(self) -> Result<ProbeRect, VerificationMismatch> {
        match self.outcome {
            ProbeOutcome::Pass => Ok(self.rect),
            ProbeOutcome::Mismatch(m) => Err(m),
        }
    }
}

/// Compares `actual` (row-major pixels of `rect`) against `command`.
///
/// `command.expected` must already have been checked to hold one value or
/// one value per pixel.
pub(crate) fn verify_pixels(
    rect: ProbeRect,
    actual: Vec<ScalarValue>,
    command: &ProbeCommand,
) -> Result<ProbeResult, EncodeError> {
    let mut first: Option<(usize, ScalarValue)> = None;
    let mut mismatched = 0usize;

    for (i, observed) in actual.iter().enumerate() {
        let Some(expected) = command.expected_at(i) else {
            break;
        };
        if !command.comparator.matches(expected, observed) {
            mismatched += 1;
            if first.is_none() {
                first = Some((i, *expected));
            }
        }
    }

    let Some((index, expected)) = first else {
        return Ok(ProbeResult {
            rect,
            outcome: ProbeOutcome::Pass,
        });
    };

    let image = encode_png(rect.width, rect.height, &actual)?;
    let width = rect.width.max(1) as usize;
    let mismatch = VerificationMismatch {
        x: rect.x + (index % width) as u32,
        y: rect.y + (index / width) as u32,
        expected,
        observed: actual[index],
        mismatched,
        total: actual.len(),
        image,
    };
    log::warn!("{mismatch}");

    Ok(ProbeResult {
        rect,
        outcome: ProbeOutcome::Mismatch(mismatch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::command::{Comparator, ProbeRegion};

    fn rect(width: u32, height: u32) -> ProbeRect {
        ProbeRect {
            x: 10,
            y: 20,
            width,
            height,
        }
    }

    fn solid(n: usize, v: u32) -> Vec<ScalarValue> {
        vec![ScalarValue::integer(u64::from(v)); n]
    }

    #[test]
    fn matching_pixels_pass_without_image() {
        let cmd = ProbeCommand::new(ProbeRegion::Whole, solid(1, 0xFF00_FF00));
        let result = verify_pixels(rect(2, 2), solid(4, 0xFF00_FF00), &cmd).unwrap();
        assert!(result.passed());
        assert!(result.diagnostic_image().is_none());
    }

    #[test]
    fn mismatch_reports_first_pixel_in_frame_coordinates() {
        let cmd = ProbeCommand::new(ProbeRegion::Whole, solid(1, 0));
        let mut actual = solid(6, 0);
        actual[4] = ScalarValue::integer(7);
        actual[5] = ScalarValue::integer(8);

        let result = verify_pixels(rect(3, 2), actual, &cmd).unwrap();
        let ProbeOutcome::Mismatch(m) = &result.outcome else {
            panic!("expected mismatch");
        };
        assert_eq!((m.x, m.y), (11, 21));
        assert_eq!(m.observed.as_u32(), 7);
        assert_eq!(m.mismatched, 2);
        assert_eq!(m.total, 6);
    }

    #[test]
    fn mismatch_image_holds_actual_pixels() {
        let cmd = ProbeCommand::new(ProbeRegion::Whole, solid(1, 0xFF00_0000));
        // BGRA storage: opaque green.
        let result = verify_pixels(rect(2, 1), solid(2, 0xFF00_FF00), &cmd).unwrap();
        let png = result.diagnostic_image().expect("image on failure");
        let img = image::load_from_memory(png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (2, 1));
        for px in img.pixels() {
            assert_eq!(px.0, [0x00, 0xFF, 0x00, 0xFF]);
        }
    }

    #[test]
    fn per_pixel_expectations_are_positional() {
        let expected = vec![ScalarValue::integer(1), ScalarValue::integer(2)];
        let cmd = ProbeCommand::new(ProbeRegion::Whole, expected);
        let ok = verify_pixels(rect(2, 1), vec![ScalarValue::integer(1), ScalarValue::integer(2)], &cmd);
        assert!(ok.unwrap().passed());

        let swapped = verify_pixels(rect(2, 1), vec![ScalarValue::integer(2), ScalarValue::integer(1)], &cmd);
        assert!(!swapped.unwrap().passed());
    }

    #[test]
    fn tolerance_comparator_accepts_near_values() {
        let cmd = ProbeCommand::new(ProbeRegion::Whole, solid(1, 0x8080_8080))
            .with_comparator(Comparator::Tolerance([2, 2, 2, 0]));
        assert!(verify_pixels(rect(1, 1), solid(1, 0x807F_8182), &cmd).unwrap().passed());
        assert!(!verify_pixels(rect(1, 1), solid(1, 0x8180_8080), &cmd).unwrap().passed());
    }

    #[test]
    fn mismatch_escalates_to_error() {
        let cmd = ProbeCommand::new(ProbeRegion::Whole, solid(1, 1));
        let err = verify_pixels(rect(1, 1), solid(1, 2), &cmd)
            .unwrap()
            .into_result()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("(10, 20)"), "{msg}");
        assert!(msg.contains("0x00000001"), "{msg}");
        assert!(msg.contains("0x00000002"), "{msg}");
    }
}
