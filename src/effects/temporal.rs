//! Frame dropping, duplication and reordering.
//!
//! Temporal operators never touch pixel data; they only decide which input
//! frames appear in the output, how often, and at which rate.

use crate::{
    effects::spec::integer_factor,
    error::{EffectError, Result},
    video::types::FrameSequence,
};

/// Whether speed-up by `n` keeps input frame `index`
pub fn keeps(index: usize, n: u32) -> bool {
    n <= 1 || index % n as usize == 0
}

/// Keep every `round(factor)`-th frame at the unchanged rate
///
/// A factor of one or less passes the sequence through.
pub fn speed_up(sequence: &FrameSequence, factor: f64) -> Result<FrameSequence> {
    let n = integer_factor(factor);
    if n <= 1 {
        return Ok(sequence.clone());
    }
    let frames = sequence
        .iter()
        .enumerate()
        .filter(|(i, _)| keeps(*i, n))
        .map(|(_, frame)| frame.clone())
        .collect();
    FrameSequence::new(frames, sequence.frame_rate())
}

/// Output rate of slow motion by a whole factor `n`
pub fn slow_motion_rate(input_rate: u32, n: u32) -> Result<u32> {
    let n = n.max(1);
    let rate = input_rate / n;
    if rate == 0 {
        return Err(EffectError::InvalidRate {
            rate: input_rate,
            factor: n,
        }
        .into());
    }
    Ok(rate)
}

/// Repeat every frame `round(factor)` times at `floor(rate / factor)`
pub fn slow_motion(sequence: &FrameSequence, factor: f64) -> Result<FrameSequence> {
    let n = integer_factor(factor);
    let rate = slow_motion_rate(sequence.frame_rate(), n)?;
    if n <= 1 {
        return Ok(sequence.clone());
    }

    let mut frames = Vec::with_capacity(sequence.len() * n as usize);
    for frame in sequence.iter() {
        for _ in 0..n {
            frames.push(frame.clone());
        }
    }
    FrameSequence::new(frames, rate)
}

/// Frames in reverse order at the same rate
pub fn reverse(sequence: FrameSequence) -> Result<FrameSequence> {
    let rate = sequence.frame_rate();
    let mut frames = sequence.into_frames();
    frames.reverse();
    FrameSequence::new(frames, rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VidfxError;
    use crate::video::types::Frame;
    use proptest::prelude::*;

    fn numbered(count: usize, rate: u32) -> FrameSequence {
        let frames = (0..count)
            .map(|i| Frame::new_filled(4, 3, [i as u8, 0, 0]))
            .collect();
        FrameSequence::new(frames, rate).unwrap()
    }

    fn tags(seq: &FrameSequence) -> Vec<u8> {
        seq.iter().map(|f| f.get_pixel(0, 0)[0]).collect()
    }

    #[test]
    fn test_speed_up_keeps_every_nth() {
        let out = speed_up(&numbered(10, 30), 2.0).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out.frame_rate(), 30);
        assert_eq!(tags(&out), vec![0, 2, 4, 6, 8]);

        let out = speed_up(&numbered(10, 30), 3.0).unwrap();
        assert_eq!(tags(&out), vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_speed_up_rounds_factor() {
        assert_eq!(speed_up(&numbered(9, 30), 2.6).unwrap().len(), 3);
        assert_eq!(speed_up(&numbered(9, 30), 1.2).unwrap().len(), 9);
    }

    #[test]
    fn test_slow_motion_duplicates_in_order() {
        let out = slow_motion(&numbered(3, 30), 2.0).unwrap();
        assert_eq!(out.frame_rate(), 15);
        assert_eq!(tags(&out), vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_slow_motion_rejects_zero_rate() {
        let result = slow_motion(&numbered(3, 3), 4.0);
        assert!(matches!(
            result,
            Err(VidfxError::Effect(EffectError::InvalidRate { rate: 3, factor: 4 }))
        ));
        assert_eq!(slow_motion_rate(4, 4).unwrap(), 1);
    }

    #[test]
    fn test_reverse_order() {
        let out = reverse(numbered(4, 24)).unwrap();
        assert_eq!(tags(&out), vec![3, 2, 1, 0]);
        assert_eq!(out.frame_rate(), 24);
    }

    proptest! {
        #[test]
        fn prop_speed_counts(count in 0usize..60, n in 1u32..5) {
            let seq = numbered(count, 30);
            let fast = speed_up(&seq, n as f64).unwrap();
            prop_assert_eq!(fast.len(), (count + n as usize - 1) / n as usize);

            let slow = slow_motion(&seq, n as f64).unwrap();
            prop_assert_eq!(slow.len(), count * n as usize);
        }

        #[test]
        fn prop_reverse_is_involution(count in 0usize..40) {
            let seq = numbered(count, 25);
            prop_assert_eq!(reverse(reverse(seq.clone()).unwrap()).unwrap(), seq);
        }
    }
}
