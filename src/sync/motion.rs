//! Deterministic movement shared by prediction, replay and the server

use crate::net::protocol::{Direction, DirectionSet, InputCmd, Position};

/// Movement rule applied once per input.
///
/// Each held direction contributes its unit vector and the sum is scaled by
/// `speed`: diagonals move `speed` on both axes, opposite directions cancel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionModel {
    pub speed: f32,
}

impl MotionModel {
    pub const fn new(speed: f32) -> Self {
        Self { speed }
    }

    /// Displacement for one input
    pub fn displacement(&self, directions: DirectionSet) -> (f32, f32) {
        let (mut dx, mut dy) = (0.0f32, 0.0f32);
        for direction in directions.iter() {
            match direction {
                Direction::Up => dy -= 1.0,
                Direction::Down => dy += 1.0,
                Direction::Left => dx -= 1.0,
                Direction::Right => dx += 1.0,
            }
        }
        (dx * self.speed, dy * self.speed)
    }

    pub fn apply(&self, pos: Position, input: &InputCmd) -> Position {
        let (dx, dy) = self.displacement(input.inputs);
        Position::new(pos.x + dx, pos.y + dy)
    }

    /// Apply `inputs` in order starting from `base`
    pub fn replay<'a>(
        &self,
        base: Position,
        inputs: impl IntoIterator<Item = &'a InputCmd>,
    ) -> Position {
        inputs
            .into_iter()
            .fold(base, |pos, input| self.apply(pos, input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(seq: u64, dirs: &[Direction]) -> InputCmd {
        InputCmd {
            seq,
            time: 0,
            inputs: dirs.iter().copied().collect(),
        }
    }

    #[test]
    fn single_directions_use_screen_axes() {
        let motion = MotionModel::new(2.0);
        let origin = Position::default();
        assert_eq!(motion.apply(origin, &cmd(1, &[Direction::Right])), Position::new(2.0, 0.0));
        assert_eq!(motion.apply(origin, &cmd(1, &[Direction::Left])), Position::new(-2.0, 0.0));
        assert_eq!(motion.apply(origin, &cmd(1, &[Direction::Up])), Position::new(0.0, -2.0));
        assert_eq!(motion.apply(origin, &cmd(1, &[Direction::Down])), Position::new(0.0, 2.0));
    }

    #[test]
    fn diagonal_is_summed_not_normalized() {
        let motion = MotionModel::new(1.0);
        let pos = motion.apply(
            Position::default(),
            &cmd(1, &[Direction::Down, Direction::Right]),
        );
        assert_eq!(pos, Position::new(1.0, 1.0));
    }

    #[test]
    fn opposite_directions_cancel() {
        let motion = MotionModel::new(3.0);
        let pos = motion.apply(
            Position::new(4.0, 4.0),
            &cmd(1, &[Direction::Left, Direction::Right, Direction::Up]),
        );
        assert_eq!(pos, Position::new(4.0, 1.0));
    }

    #[test]
    fn replay_folds_in_order() {
        let motion = MotionModel::new(1.0);
        let log = [
            cmd(1, &[Direction::Right]),
            cmd(2, &[Direction::Right]),
            cmd(3, &[Direction::Up]),
        ];
        assert_eq!(motion.replay(Position::default(), &log), Position::new(2.0, -1.0));
        assert_eq!(motion.replay(Position::new(5.0, 5.0), []), Position::new(5.0, 5.0));
    }
}
