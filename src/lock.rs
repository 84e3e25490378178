//! Target lock: turns scored candidates into a single sticky winner with
//! switch/clear hysteresis (spec §4.2). Grounded on this codebase's
//! `monitor::pid::PidPressureController::classify_with_hysteresis` — same
//! shape of a fast-attack, slow-decay state machine with a dwell counter
//! gating state transitions, generalized from a scalar pressure level to a
//! winning island key.

use crate::core::config::LockConfig;
use crate::key::IslandKey;
use crate::locator::Candidate;
use crate::predictor::KineticPredictor;

/// One scored entry in a [`Selection`]'s top list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub key: IslandKey,
    pub score: f64,
    pub d_sq: f64,
}

/// Output of a [`TargetLock::update`] call (spec §3 `Selection`).
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Current committed winner, if any.
    pub winner: Option<IslandKey>,
    pub winner_score: f64,
    pub best_key: Option<IslandKey>,
    pub best_score: f64,
    pub second_score: f64,
    pub margin2nd: f64,
    pub nearest_key: Option<IslandKey>,
    pub nearest_d_sq: f64,
    pub speed: f64,
    pub actuate: bool,
    pub pending_key: Option<IslandKey>,
    pub pending_count: u32,
    pub top: Vec<ScoredCandidate>,
}

/// Sticky winner/pending hysteresis over per-frame scored candidates.
#[derive(Debug, Clone)]
pub struct TargetLock {
    config: LockConfig,
    winner_key: Option<IslandKey>,
    winner_score: f64,
    pending_key: Option<IslandKey>,
    pending_count: u32,
    no_evidence_ms: f64,
}

impl TargetLock {
    #[must_use]
    pub fn new(config: LockConfig) -> Self {
        Self {
            config,
            winner_key: None,
            winner_score: 0.0,
            pending_key: None,
            pending_count: 0,
            no_evidence_ms: 0.0,
        }
    }

    pub fn set_config(&mut self, config: LockConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn winner(&self) -> Option<IslandKey> {
        self.winner_key
    }

    fn clear(&mut self) {
        self.winner_key = None;
        self.winner_score = 0.0;
        self.pending_key = None;
        self.pending_count = 0;
        self.no_evidence_ms = 0.0;
    }

    /// Score `candidates` against the cursor and advance the hysteresis state
    /// machine by one tick of `dt_ms`.
    pub fn update(
        &mut self,
        candidates: &[Candidate],
        cursor: (f64, f64),
        predictor: &KineticPredictor,
        dt_ms: f64,
    ) -> Selection {
        let (cursor_x, cursor_y) = cursor;
        let mut ranked: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|candidate| {
                let d_sq = candidate.rect.distance_sq(cursor_x, cursor_y);
                let radius = self.config.radius_mul * candidate.rect.w.min(candidate.rect.h);
                let radius_sq = radius * radius;
                let cx = candidate.rect.x + candidate.rect.w / 2.0;
                let cy = candidate.rect.y + candidate.rect.h / 2.0;
                let score = predictor.hint(cx - cursor_x, cy - cursor_y, radius_sq);
                ScoredCandidate { key: candidate.key, score, d_sq }
            })
            .collect();

        ranked.sort_by(|a, b| a.d_sq.partial_cmp(&b.d_sq).unwrap_or(std::cmp::Ordering::Equal));
        let nearest = ranked.first().map(|c| (c.key, c.d_sq));

        let top_k = self.config.top_k.max(1);
        if ranked.len() > top_k {
            if let Some(winner) = self.winner_key {
                let already_kept = ranked[..top_k].iter().any(|c| c.key == winner);
                if already_kept {
                    ranked.truncate(top_k);
                } else if let Some(pos) = ranked[top_k..].iter().position(|c| c.key == winner) {
                    let entry = ranked.remove(top_k + pos);
                    ranked.truncate(top_k - 1);
                    ranked.push(entry);
                } else {
                    ranked.truncate(top_k);
                }
            } else {
                ranked.truncate(top_k);
            }
        }

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let best = ranked.first().copied();
        let second = ranked.get(1).copied();
        let evidence = best.is_some_and(|candidate| candidate.score >= self.config.score_floor);

        let report_n = self.config.report_top_n.min(ranked.len());
        let top = ranked[..report_n].to_vec();

        let base = PartialSelection {
            best_key: best.map(|c| c.key),
            best_score: best.map_or(0.0, |c| c.score),
            second_score: second.map_or(0.0, |c| c.score),
            margin2nd: best.map_or(0.0, |c| c.score - second.map_or(0.0, |s| s.score)),
            nearest_key: nearest.map(|(key, _)| key),
            nearest_d_sq: nearest.map_or(0.0, |(_, d)| d),
            speed: predictor.speed(),
            top,
        };

        if !evidence {
            return self.on_no_evidence(candidates, cursor, dt_ms, base);
        }

        self.no_evidence_ms = 0.0;
        let best = best.expect("evidence implies best is Some");
        let margin_ok = second.map_or(true, |s| best.score - s.score >= self.config.min_margin_2nd);

        let actuate = match self.winner_key {
            None => {
                self.winner_key = Some(best.key);
                self.winner_score = best.score;
                self.pending_key = None;
                self.pending_count = 0;
                margin_ok
            }
            Some(winner) if winner == best.key => {
                self.winner_score = best.score;
                self.pending_key = None;
                self.pending_count = 0;
                margin_ok
            }
            Some(_) => {
                let switch_ready =
                    best.score >= self.winner_score + self.config.switch_margin && margin_ok;
                if switch_ready {
                    if self.pending_key == Some(best.key) {
                        self.pending_count += 1;
                    } else {
                        self.pending_key = Some(best.key);
                        self.pending_count = 1;
                    }
                    if self.pending_count >= self.config.hold_frames {
                        self.winner_key = Some(best.key);
                        self.winner_score = best.score;
                        self.pending_key = None;
                        self.pending_count = 0;
                        true
                    } else {
                        false
                    }
                } else {
                    self.pending_key = None;
                    self.pending_count = 0;
                    false
                }
            }
        };

        base.finish(self.winner_key, self.winner_score, actuate, self.pending_key, self.pending_count)
    }

    fn on_no_evidence(
        &mut self,
        candidates: &[Candidate],
        cursor: (f64, f64),
        dt_ms: f64,
        base: PartialSelection,
    ) -> Selection {
        self.no_evidence_ms += dt_ms;
        let Some(winner) = self.winner_key else {
            return base.finish(None, 0.0, false, None, 0);
        };

        let nearest = candidates
            .iter()
            .min_by(|a, b| {
                let da = a.rect.distance_sq(cursor.0, cursor.1);
                let db = b.rect.distance_sq(cursor.0, cursor.1);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| (c.key, c.rect.distance_sq(cursor.0, cursor.1)));

        let holding = nearest.is_some_and(|(key, d_sq)| {
            key == winner
                && d_sq <= self.config.stick_dist_px * self.config.stick_dist_px
                && self.no_evidence_ms <= self.config.no_evidence_hold_ms
        });

        if holding {
            self.winner_score *= self.config.decay;
            base.finish(self.winner_key, self.winner_score, false, self.pending_key, self.pending_count)
        } else if self.no_evidence_ms >= self.config.clear_after_ms {
            self.clear();
            base.finish(None, 0.0, false, None, 0)
        } else {
            base.finish(self.winner_key, self.winner_score, false, self.pending_key, self.pending_count)
        }
    }
}

/// Fields of a [`Selection`] that don't depend on the hysteresis outcome.
struct PartialSelection {
    best_key: Option<IslandKey>,
    best_score: f64,
    second_score: f64,
    margin2nd: f64,
    nearest_key: Option<IslandKey>,
    nearest_d_sq: f64,
    speed: f64,
    top: Vec<ScoredCandidate>,
}

impl PartialSelection {
    fn finish(
        self,
        winner: Option<IslandKey>,
        winner_score: f64,
        actuate: bool,
        pending_key: Option<IslandKey>,
        pending_count: u32,
    ) -> Selection {
        Selection {
            winner,
            winner_score,
            best_key: self.best_key,
            best_score: self.best_score,
            second_score: self.second_score,
            margin2nd: self.margin2nd,
            nearest_key: self.nearest_key,
            nearest_d_sq: self.nearest_d_sq,
            speed: self.speed,
            actuate,
            pending_key,
            pending_count,
            top: self.top,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PredictorConfig;
    use crate::locator::Rect;

    fn candidate(type_id: u16, x: f64, y: f64) -> Candidate {
        Candidate { key: IslandKey::pack(type_id, 0, 0).unwrap(), rect: Rect { x, y, w: 40.0, h: 40.0 } }
    }

    fn predictor_near(cursor: (f64, f64)) -> KineticPredictor {
        let mut predictor = KineticPredictor::new(PredictorConfig::default());
        predictor.reset(cursor.0, cursor.1);
        predictor
    }

    #[test]
    fn no_candidates_yields_no_winner() {
        let mut lock = TargetLock::new(LockConfig::default());
        let predictor = predictor_near((0.0, 0.0));
        let selection = lock.update(&[], (0.0, 0.0), &predictor, 16.0);
        assert_eq!(selection.winner, None);
        assert!(!selection.actuate);
        assert_eq!(selection.nearest_key, None);
    }

    #[test]
    fn single_strong_candidate_wins_without_a_rival() {
        let mut lock = TargetLock::new(LockConfig { score_floor: 0.0, min_margin_2nd: 0.0, ..LockConfig::default() });
        let predictor = predictor_near((10.0, 10.0));
        let candidates = [candidate(1, 5.0, 5.0)];
        let selection = lock.update(&candidates, (10.0, 10.0), &predictor, 16.0);
        assert_eq!(selection.winner, Some(candidates[0].key));
        assert_eq!(selection.best_key, Some(candidates[0].key));
        assert!(selection.actuate);
    }

    #[test]
    fn winner_holds_through_a_transient_no_evidence_gap() {
        let mut lock = TargetLock::new(LockConfig { score_floor: 0.0, min_margin_2nd: 0.0, ..LockConfig::default() });
        let predictor = predictor_near((10.0, 10.0));
        let candidates = [candidate(1, 5.0, 5.0)];
        lock.update(&candidates, (10.0, 10.0), &predictor, 16.0);
        let winner = lock.winner();
        let mut starved = TargetLock::new(LockConfig { score_floor: 2.0, ..lock.config });
        starved.winner_key = winner;
        starved.winner_score = lock.winner_score;
        let selection = starved.update(&candidates, (10.0, 10.0), &predictor, 16.0);
        assert_eq!(selection.winner, winner);
        assert!(!selection.actuate);
    }

    #[test]
    fn winner_clears_after_extended_no_evidence() {
        let cfg = LockConfig { score_floor: 2.0, clear_after_ms: 100.0, no_evidence_hold_ms: 0.0, ..LockConfig::default() };
        let mut lock = TargetLock::new(cfg);
        lock.winner_key = IslandKey::pack(1, 0, 0);
        lock.winner_score = 1.0;
        let predictor = predictor_near((0.0, 0.0));
        let selection = lock.update(&[], (0.0, 0.0), &predictor, 200.0);
        assert_eq!(selection.winner, None);
    }

    #[test]
    fn switch_commits_only_after_hold_frames() {
        let cfg = LockConfig {
            score_floor: 0.0,
            min_margin_2nd: 0.0,
            switch_margin: 0.0,
            hold_frames: 3,
            ..LockConfig::default()
        };
        let mut lock = TargetLock::new(cfg);
        let predictor = predictor_near((0.0, 0.0));
        let near = candidate(1, 1.0, 0.0);
        let far = candidate(2, 1000.0, 1000.0);
        lock.update(&[near, far], (0.0, 0.0), &predictor, 16.0);
        assert_eq!(lock.winner(), Some(near.key));

        // Rival now scores at least as well: dwell for hold_frames-1 ticks,
        // then commit on the hold_frames-th.
        let rival_near = candidate(2, 1.0, 0.0);
        for _ in 0..2 {
            let selection = lock.update(&[far, rival_near], (0.0, 0.0), &predictor, 16.0);
            assert_eq!(selection.winner, Some(near.key));
            assert!(!selection.actuate);
        }
        let selection = lock.update(&[far, rival_near], (0.0, 0.0), &predictor, 16.0);
        assert_eq!(selection.winner, Some(rival_near.key));
        assert!(selection.actuate);
    }
}
