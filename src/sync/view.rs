//! Render-facing read-only view of the player table

use tracing::{debug, trace};

use crate::net::protocol::{PlayerId, Position};

use super::reconcile::{PlayerRegistry, PresentationHandle};

/// One player as the presentation layer sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub handle: PresentationHandle,
    pub pos: Position,
    pub is_local: bool,
}

/// Player positions after a tick, sorted by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldView {
    pub tick: u64,
    pub players: Vec<PlayerView>,
    /// Handles whose players were removed since the previous view
    pub released: Vec<PresentationHandle>,
}

impl WorldView {
    pub fn capture(tick: u64, registry: &mut PlayerRegistry) -> Self {
        let local = registry.local_id();
        let mut players: Vec<PlayerView> = registry
            .iter()
            .map(|p| PlayerView {
                id: p.id,
                handle: p.handle(),
                pos: p.pos,
                is_local: Some(p.id) == local,
            })
            .collect();
        players.sort_by_key(|p| p.id);

        Self {
            tick,
            players,
            released: registry.take_released(),
        }
    }

    pub fn local(&self) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.is_local)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| &p.id == id)
    }
}

/// Presentation layer collaborator
pub trait Renderer: Send {
    fn render(&mut self, view: &WorldView);
}

/// Renderer that only logs: every frame at trace, a summary periodically
#[derive(Debug, Clone)]
pub struct LogRenderer {
    summary_every: u64,
}

impl LogRenderer {
    pub fn new(summary_every: u64) -> Self {
        Self {
            summary_every: summary_every.max(1),
        }
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, view: &WorldView) {
        for handle in &view.released {
            debug!(?handle, "Released presentation handle");
        }
        for p in &view.players {
            trace!(tick = view.tick, player_id = %p.id, x = p.pos.x, y = p.pos.y, "Draw");
        }
        if view.tick % self.summary_every == 0 {
            if let Some(local) = view.local() {
                debug!(
                    tick = view.tick,
                    players = view.players.len(),
                    x = local.pos.x,
                    y = local.pos.y,
                    "Frame"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::motion::MotionModel;
    use crate::sync::reconcile::Reconciler;
    use crate::net::protocol::PlayerDescriptor;
    use uuid::Uuid;

    #[test]
    fn capture_marks_local_and_drains_released() {
        let mut rec = Reconciler::new(MotionModel::new(1.0), true);
        let me = PlayerId(Uuid::from_u128(5));
        let other = PlayerId(Uuid::from_u128(2));
        rec.login(PlayerDescriptor {
            id: me,
            pos: Position::new(1.0, 1.0),
        });
        rec.login(PlayerDescriptor {
            id: other,
            pos: Position::default(),
        });

        let view = WorldView::capture(1, rec.registry_mut());
        assert_eq!(view.players.len(), 2);
        assert_eq!(view.players[0].id, other);
        assert_eq!(view.local().unwrap().id, me);
        assert!(view.released.is_empty());

        let handle = view.get(&other).unwrap().handle;
        rec.logout(other);
        let view = WorldView::capture(2, rec.registry_mut());
        assert_eq!(view.released, vec![handle]);
        assert!(view.get(&other).is_none());
    }
}
