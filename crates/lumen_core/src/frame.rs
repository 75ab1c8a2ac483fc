use crate::MAX_FRAMES_IN_FLIGHT;

/// Tracks which frame-in-flight slot the CPU is currently recording.
///
/// Waiting on the GPU before a slot is reused is the caller's job; the clock
/// only hands out indices.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    frames_in_flight: usize,
    frame_number: u64,
}

impl FrameClock {
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(
            (1..=MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight),
            "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {frames_in_flight}"
        );
        Self {
            frames_in_flight,
            frame_number: 0,
        }
    }

    /// Called by the engine loop once per frame
    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn frame_index(&self) -> usize {
        (self.frame_number % self.frames_in_flight as u64) as usize
    }

    /// Dirty-mask bit owned by the current frame slot.
    pub fn frame_bit(&self) -> u8 {
        1 << self.frame_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_wraps() {
        let mut clock = FrameClock::new(3);
        let indices: Vec<usize> = (0..7)
            .map(|_| {
                let i = clock.frame_index();
                clock.advance();
                i
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(clock.frame_number(), 7);
        assert_eq!(clock.frame_bit(), 0b010);
    }

    #[test]
    #[should_panic]
    fn rejects_too_many_frames() {
        FrameClock::new(MAX_FRAMES_IN_FLIGHT + 1);
    }
}
