//! Roster of connected participants and their last-known positions

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::{PeerInfo, Position};

/// Default half-extent of the world on each axis
pub const DEFAULT_WORLD_LIMIT: f64 = 200.0;

/// Server-side table of connected participants
#[derive(Debug)]
pub struct Roster {
    participants: HashMap<Uuid, Position>,
    limit: f64,
}

impl Roster {
    /// Create an empty roster that clamps positions into `[-limit, limit]`
    pub fn new(limit: f64) -> Self {
        Self {
            participants: HashMap::new(),
            limit: limit.abs(),
        }
    }

    /// Register a new participant at the origin and return its identity
    pub fn connect(&mut self) -> Uuid {
        let mut id = Uuid::new_v4();
        while self.participants.contains_key(&id) {
            id = Uuid::new_v4();
        }
        self.participants.insert(id, Position::ORIGIN);
        id
    }

    /// Remove a participant. Returns false if it was already gone.
    pub fn disconnect(&mut self, id: Uuid) -> bool {
        self.participants.remove(&id).is_some()
    }

    /// Everyone except `excluding`, in no particular order
    pub fn snapshot(&self, excluding: Uuid) -> Vec<PeerInfo> {
        self.participants
            .iter()
            .filter(|(id, _)| **id != excluding)
            .map(|(id, pos)| PeerInfo { id: *id, pos: *pos })
            .collect()
    }

    /// Store a reported position, clamped into the world bounds.
    ///
    /// Non-finite coordinates and unknown identities are ignored. Returns the
    /// stored position when the update was applied.
    pub fn update_position(&mut self, id: Uuid, x: f64, y: f64) -> Option<Position> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        let pos = self.participants.get_mut(&id)?;
        *pos = Position {
            x: x.clamp(-self.limit, self.limit),
            y: y.clamp(-self.limit, self.limit),
        };
        Some(*pos)
    }

    pub fn position(&self, id: Uuid) -> Option<Position> {
        self.participants.get(&id).copied()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new(DEFAULT_WORLD_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_assigns_distinct_identities_at_origin() {
        let mut roster = Roster::default();
        let a = roster.connect();
        let b = roster.connect();

        assert_ne!(a, b);
        assert_eq!(roster.position(a), Some(Position::ORIGIN));
        assert_eq!(roster.position(b), Some(Position::ORIGIN));
    }

    #[test]
    fn size_tracks_connects_minus_disconnects() {
        let mut roster = Roster::default();
        let ids: Vec<Uuid> = (0..7).map(|_| roster.connect()).collect();

        for id in &ids[..3] {
            assert!(roster.disconnect(*id));
        }

        assert_eq!(roster.len(), 4);
    }

    #[test]
    fn duplicate_disconnect_is_a_no_op() {
        let mut roster = Roster::default();
        let a = roster.connect();
        let b = roster.connect();

        assert!(roster.disconnect(a));
        assert!(!roster.disconnect(a));
        assert!(!roster.disconnect(Uuid::new_v4()));
        assert_eq!(roster.len(), 1);
        assert!(roster.contains(b));
    }

    #[test]
    fn in_range_positions_are_stored_exactly() {
        let mut roster = Roster::default();
        let a = roster.connect();

        for (x, y) in [(10.0, 20.0), (-200.0, 200.0), (0.25, -199.75), (0.0, 0.0)] {
            assert_eq!(roster.update_position(a, x, y), Some(Position::new(x, y)));
            assert_eq!(roster.position(a), Some(Position::new(x, y)));
        }
    }

    #[test]
    fn out_of_range_positions_are_clamped_to_the_boundary() {
        let mut roster = Roster::default();
        let a = roster.connect();

        roster.update_position(a, 500.0, -201.0);
        assert_eq!(roster.position(a), Some(Position::new(200.0, -200.0)));

        roster.update_position(a, -1e9, 1e9);
        assert_eq!(roster.position(a), Some(Position::new(-200.0, 200.0)));

        assert_eq!(
            roster.update_position(a, 1e300, -1e300),
            Some(Position::new(200.0, -200.0))
        );
    }

    #[test]
    fn in_range_positions_keep_full_precision() {
        let mut roster = Roster::default();
        let a = roster.connect();

        roster.update_position(a, 10.123456789, -0.000000123456789);
        assert_eq!(
            roster.position(a),
            Some(Position::new(10.123456789, -0.000000123456789))
        );
    }

    #[test]
    fn non_finite_positions_leave_state_unchanged() {
        let mut roster = Roster::default();
        let a = roster.connect();
        roster.update_position(a, 5.0, 6.0);

        assert_eq!(roster.update_position(a, f64::NAN, 1.0), None);
        assert_eq!(roster.update_position(a, 1.0, f64::INFINITY), None);
        assert_eq!(roster.update_position(a, f64::NEG_INFINITY, f64::NAN), None);
        assert_eq!(roster.position(a), Some(Position::new(5.0, 6.0)));
    }

    #[test]
    fn update_for_unknown_identity_is_ignored() {
        let mut roster = Roster::default();
        roster.connect();

        assert_eq!(roster.update_position(Uuid::new_v4(), 1.0, 1.0), None);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn snapshot_excludes_the_requester() {
        let mut roster = Roster::default();
        let a = roster.connect();
        let b = roster.connect();
        let c = roster.connect();
        roster.update_position(b, 3.0, 4.0);

        let mut ids: Vec<Uuid> = roster.snapshot(a).into_iter().map(|p| p.id).collect();
        ids.sort();
        let mut expected = vec![b, c];
        expected.sort();

        assert_eq!(ids, expected);
        assert!(roster
            .snapshot(a)
            .contains(&PeerInfo { id: b, pos: Position::new(3.0, 4.0) }));
    }

    #[test]
    fn custom_limit_is_symmetric() {
        let mut roster = Roster::new(-50.0);
        let a = roster.connect();
        roster.update_position(a, 80.0, -80.0);
        assert_eq!(roster.position(a), Some(Position::new(50.0, -50.0)));
    }
}
