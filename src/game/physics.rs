//! Paddle movement, ball motion and bound/paddle collisions

use super::state::{Ball, InputEvent, InputState, Key, Paddle, Player, StateGame, Table};
use super::stats::StateEngine;

/// Outcome of a ball step on the scoring axis
#[derive(Debug, Clone, PartialEq)]
pub enum RallyEvent {
    /// The defending paddle returned the ball
    Touched { player_id: String },
    /// The ball passed the defending paddle
    Scored { player_id: String },
}

/// Deterministic per-tick simulation. No randomness: the next state is a
/// function of the current state and the held keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicsEngine;

impl PhysicsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Advance one tick: paddles from held keys, then the ball
    pub fn update(&self, state: &mut StateGame, stats: &mut StateEngine) -> Option<RallyEvent> {
        let table = state.table;

        for player in state.players.iter() {
            let Some(index) = state.paddle_index(&player.base.id) else {
                continue;
            };
            let paddle = &mut state.paddles[index];

            Self::move_paddle(paddle, &player.base.input_state);

            let max_bound = Self::paddle_bound(&table, paddle);
            paddle.pos_z = paddle.pos_z.clamp(-max_bound, max_bound);
        }

        self.move_ball(state, stats)
    }

    /// Record a key transition for the next tick
    pub fn handle_player_input(&self, player: &mut Player, event: InputEvent) {
        player.base.input_state.set(event.key, event.pressed);
    }

    /// Both keys may be held at once and cancel out
    pub fn move_paddle(paddle: &mut Paddle, input: &InputState) {
        if input.is_pressed(Key::Up) {
            paddle.pos_z -= paddle.speed;
        }
        if input.is_pressed(Key::Down) {
            paddle.pos_z += paddle.speed;
        }
    }

    /// Largest |pos_z| that keeps the paddle between the side walls
    pub fn paddle_bound(table: &Table, paddle: &Paddle) -> f32 {
        (table.depth / 2.0 - paddle.width / 2.0 - table.wall_thickness).max(0.0)
    }

    /// Depth axis: bounce off the side walls, reflecting the overshoot
    pub fn move_ball_z(ball: &mut Ball, table: &Table) {
        ball.pos_z += ball.dir_z * ball.speed;

        let max_z = (table.depth / 2.0 - ball.radius() - table.wall_thickness).max(0.0);
        ball.on_wall = false;

        if ball.pos_z > max_z {
            ball.pos_z = max_z - (ball.pos_z - max_z);
            ball.dir_z = -ball.dir_z;
            ball.on_wall = true;
        } else if ball.pos_z < -max_z {
            ball.pos_z = -max_z - (ball.pos_z + max_z);
            ball.dir_z = -ball.dir_z;
            ball.on_wall = true;
        }

        // Only reachable when a single step is wider than the table
        ball.pos_z = ball.pos_z.clamp(-max_z, max_z);
    }

    /// Full ball step. On the lateral axis the defending paddle either
    /// returns the ball or the attacker scores and the ball is re-centred.
    pub fn move_ball(&self, state: &mut StateGame, stats: &mut StateEngine) -> Option<RallyEvent> {
        Self::move_ball_z(&mut state.ball, &state.table);

        let ball = &mut state.ball;
        ball.pos_x += ball.dir_x * ball.speed;

        let defender = if ball.dir_x > 0.0 { 0 } else { 1 };
        let paddle = &state.paddles[defender];
        let radius = ball.radius();
        let max_x = state.table.width / 2.0 - state.table.wall_thickness - paddle.depth - radius;
        let distance = ball.pos_x.abs();

        if distance > max_x && (ball.pos_z - paddle.pos_z).abs() <= paddle.width / 2.0 {
            let overshoot = distance - max_x;
            ball.pos_x = ball.pos_x.signum() * (max_x - overshoot);
            ball.dir_x = -ball.dir_x;

            let player_id = paddle.id.clone();
            stats.update_touched_ball(state, &player_id);
            Some(RallyEvent::Touched { player_id })
        } else if distance - radius >= max_x {
            ball.pos_x = 0.0;
            ball.pos_z = 0.0;

            let player_id = state.paddles[1 - defender].id.clone();
            stats.update_score(state, &player_id);
            Some(RallyEvent::Scored { player_id })
        } else {
            None
        }
    }
}
