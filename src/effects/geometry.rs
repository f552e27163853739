use image::imageops;

use crate::{
    effects::{spec::FlipDirection, traits::FrameOperator},
    error::Result,
    video::types::Frame,
};

/// Exact pixel remap for `direction`; no interpolation is involved
pub fn flip(frame: &Frame, direction: FlipDirection) -> Frame {
    let image = frame.as_image();
    let remapped = match direction {
        FlipDirection::Identity => return frame.clone(),
        FlipDirection::RotateCw90 => imageops::rotate90(image),
        FlipDirection::RotateCcw90 => imageops::rotate270(image),
        FlipDirection::FlipVertical => imageops::flip_vertical(image),
        FlipDirection::FlipHorizontal => imageops::flip_horizontal(image),
        FlipDirection::Down => imageops::rotate180(&imageops::flip_vertical(image)),
    };
    Frame::new(remapped)
}

/// Rotate/flip stage
pub struct FlipOperator {
    direction: FlipDirection,
}

impl FlipOperator {
    pub fn new(direction: FlipDirection) -> Self {
        Self { direction }
    }
}

impl FrameOperator for FlipOperator {
    fn name(&self) -> &str {
        "flip"
    }

    fn apply(&self, _index: usize, frame: &Frame) -> Result<Frame> {
        Ok(flip(frame, self.direction))
    }

    fn output_dimensions(&self, (width, height): (u32, u32)) -> (u32, u32) {
        if self.direction.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gradient(width: u32, height: u32) -> Frame {
        Frame::from_fn(width, height, |x, y| [x as u8, y as u8, (x * 7 + y * 13) as u8])
    }

    #[test]
    fn test_rotate_cw_moves_top_left_to_top_right() {
        let frame = gradient(4, 3);
        let rotated = flip(&frame, FlipDirection::RotateCw90);
        assert_eq!(rotated.dimensions(), (3, 4));
        // Top-left of the source ends up in the top-right corner
        assert_eq!(rotated.get_pixel(2, 0), frame.get_pixel(0, 0));
    }

    #[test]
    fn test_rotate_ccw_moves_top_left_to_bottom_left() {
        let frame = gradient(4, 3);
        let rotated = flip(&frame, FlipDirection::RotateCcw90);
        assert_eq!(rotated.dimensions(), (3, 4));
        assert_eq!(rotated.get_pixel(0, 3), frame.get_pixel(0, 0));
    }

    #[test]
    fn test_vertical_and_horizontal_flips() {
        let frame = gradient(5, 4);
        let v = flip(&frame, FlipDirection::FlipVertical);
        assert_eq!(v.get_pixel(1, 0), frame.get_pixel(1, 3));
        let h = flip(&frame, FlipDirection::FlipHorizontal);
        assert_eq!(h.get_pixel(0, 2), frame.get_pixel(4, 2));
    }

    #[test]
    fn test_down_equals_horizontal_mirror() {
        let frame = gradient(6, 5);
        assert_eq!(
            flip(&frame, FlipDirection::Down),
            flip(&frame, FlipDirection::FlipHorizontal)
        );
    }

    #[test]
    fn test_operator_reports_swapped_dimensions() {
        let op = FlipOperator::new(FlipDirection::RotateCw90);
        assert_eq!(op.output_dimensions((64, 48)), (48, 64));
        let op = FlipOperator::new(FlipDirection::FlipHorizontal);
        assert_eq!(op.output_dimensions((64, 48)), (64, 48));
    }

    proptest! {
        #[test]
        fn prop_cw_then_ccw_is_identity(width in 1u32..12, height in 1u32..12, seed in any::<u8>()) {
            let frame = Frame::from_fn(width, height, |x, y| {
                [seed.wrapping_add(x as u8), y as u8, seed ^ (x + y) as u8]
            });
            let back = flip(&flip(&frame, FlipDirection::RotateCw90), FlipDirection::RotateCcw90);
            prop_assert_eq!(back, frame);
        }

        #[test]
        fn prop_dimension_invariants(width in 1u32..16, height in 1u32..16) {
            let frame = Frame::new_black(width, height);
            for direction in [
                FlipDirection::Identity,
                FlipDirection::FlipVertical,
                FlipDirection::FlipHorizontal,
                FlipDirection::Down,
            ] {
                prop_assert_eq!(flip(&frame, direction).dimensions(), (width, height));
            }
            prop_assert_eq!(flip(&frame, FlipDirection::RotateCw90).dimensions(), (height, width));
            prop_assert_eq!(flip(&frame, FlipDirection::RotateCcw90).dimensions(), (height, width));
        }
    }
}
