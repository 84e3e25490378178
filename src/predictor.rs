//! Brown-Holt double-exponential kinematic smoothing and intent scoring
//! (spec §4.1). Grounded on this codebase's adaptive-alpha EWMA rate
//! estimator (`monitor::ewma::DiskRateEstimator`), generalized from a scalar
//! rate to a 2D position/velocity/acceleration estimate, and from "time to
//! threshold breach" to a directional intent score against a target rect.

use crate::core::config::PredictorConfig;

/// A 2D vector; used internally for the smoother's levels and derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Vec2 {
    x: f64,
    y: f64,
}

impl Vec2 {
    const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn dot(self, other: Self) -> f64 {
        self.x.mul_add(other.x, self.y * other.y)
    }

    fn len_sq(self) -> f64 {
        self.dot(self)
    }

    fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

/// Smoothed kinematics for one tick (spec §3 `Kinematics`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub px: f64,
    pub py: f64,
    pub vx: f64,
    pub vy: f64,
    pub ax: f64,
    pub ay: f64,
    pub v_sq: f64,
}

/// Brown-Holt smoother plus intent scoring over the smoothed kinematics.
#[derive(Debug, Clone)]
pub struct KineticPredictor {
    config: PredictorConfig,
    s1: Vec2,
    s2: Vec2,
    v: Vec2,
    a: Vec2,
    initialized: bool,
}

impl KineticPredictor {
    #[must_use]
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            s1: Vec2::default(),
            s2: Vec2::default(),
            v: Vec2::default(),
            a: Vec2::default(),
            initialized: false,
        }
    }

    pub fn set_config(&mut self, config: PredictorConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn config(&self) -> PredictorConfig {
        self.config
    }

    /// Current smoothed speed `√v²`.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.v.len_sq().sqrt()
    }

    /// Seed both smoothing levels to `(x, y)` and zero velocity/acceleration.
    pub fn reset(&mut self, x: f64, y: f64) {
        self.s1 = Vec2::new(x, y);
        self.s2 = Vec2::new(x, y);
        self.v = Vec2::default();
        self.a = Vec2::default();
        self.initialized = true;
    }

    /// Ingest a pointer sample and return the freshly smoothed kinematics.
    pub fn update(&mut self, mx: f64, my: f64, dt_ms: f64) -> Kinematics {
        if !self.initialized {
            self.reset(mx, my);
        }
        let dt = dt_ms.max(1.0).min(1000.0);
        let base = (1.0 - self.config.alpha_ref).clamp(1e-9, 1.0 - 1e-9);
        let alpha = (1.0 - base.powf(dt / self.config.dt_ref_ms.max(self.config.eps)))
            .clamp(1e-4, 0.9999);

        let sample = Vec2::new(mx, my);
        let prev_s1 = self.s1;
        self.s1 = sample.scale(alpha).sub(prev_s1.scale(-(1.0 - alpha)));
        let prev_s2 = self.s2;
        self.s2 = self.s1.scale(alpha).sub(prev_s2.scale(-(1.0 - alpha)));

        let position = self.s1.scale(2.0).sub(self.s2);
        let trend = self.s1.sub(self.s2).scale(alpha / (1.0 - alpha).max(self.config.eps));
        let prev_v = self.v;
        let raw_v = trend.scale(1.0 / dt);
        self.v = clamp_magnitude(raw_v, self.config.v_max);
        self.a = self.v.sub(prev_v).scale(1.0 / dt);

        Kinematics {
            px: position.x,
            py: position.y,
            vx: self.v.x,
            vy: self.v.y,
            ax: self.a.x,
            ay: self.a.y,
            v_sq: self.v.len_sq(),
        }
    }

    /// Intent score in `[0,1]` that the cursor is heading toward a target at
    /// offset `(dx, dy)` with squared radius `target_radius_sq`.
    #[must_use]
    pub fn hint(&self, dx: f64, dy: f64, target_radius_sq: f64) -> f64 {
        let cfg = &self.config;
        let d_sq = dx.mul_add(dx, dy * dy);
        if d_sq < cfg.eps {
            return 1.0;
        }
        let prox = (target_radius_sq / (d_sq + cfg.eps)).min(1.0);

        let v_sq = self.v.len_sq();
        let v_min_sq = cfg.v_min * cfg.v_min;
        if v_sq < v_min_sq {
            return self.low_speed_score(d_sq, target_radius_sq, prox);
        }

        let speed = v_sq.sqrt();
        let horizon = cfg.horizon_base_px + speed * cfg.horizon_ms;
        if d_sq > target_radius_sq && d_sq > horizon * horizon {
            return 0.0;
        }

        let delta = Vec2::new(dx, dy);
        let dot = self.v.dot(delta);
        if dot <= 0.0 {
            return 0.0;
        }

        if d_sq > target_radius_sq {
            let t = ((speed - cfg.v_min) / (cfg.v_theta - cfg.v_min).max(cfg.eps)).clamp(0.0, 1.0);
            let cos_theta_sq = cfg.cos_theta_sq_slow + t * (cfg.cos_theta_sq_fast - cfg.cos_theta_sq_slow);
            if dot * dot < cos_theta_sq * v_sq * d_sq {
                return 0.0;
            }
        }

        let alignment = (dot * dot / (v_sq * d_sq + cfg.eps)).min(1.0);

        let v_brake_min_sq = cfg.v_brake_min * cfg.v_brake_min;
        let va = self.v.dot(self.a);
        let brake = if v_sq >= v_brake_min_sq && va < 0.0 {
            let decel_boost = (-va / v_sq.max(v_min_sq)) * cfg.brake_tau_ms;
            (cfg.brake_floor + decel_boost * prox).clamp(cfg.brake_floor, cfg.brake_max)
        } else {
            cfg.brake_floor
        };

        let prox_term = cfg.proximity_bias + (1.0 - cfg.proximity_bias) * prox;
        (brake * alignment * prox_term).min(1.0)
    }

    fn low_speed_score(&self, d_sq: f64, target_radius_sq: f64, prox: f64) -> f64 {
        let cfg = &self.config;
        if d_sq <= target_radius_sq {
            1.0
        } else if d_sq <= cfg.low_speed_near_mul * cfg.low_speed_near_mul * target_radius_sq {
            (cfg.low_speed_prox_scale * prox).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

fn clamp_magnitude(v: Vec2, max_magnitude: f64) -> Vec2 {
    let mag_sq = v.len_sq();
    let max_sq = max_magnitude * max_magnitude;
    if mag_sq <= max_sq || mag_sq == 0.0 {
        return v;
    }
    v.scale(max_magnitude / mag_sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn predictor() -> KineticPredictor {
        KineticPredictor::new(PredictorConfig::default())
    }

    #[test]
    fn dt_zero_and_extreme_dt_stay_finite() {
        let mut predictor = predictor();
        predictor.reset(0.0, 0.0);
        let k1 = predictor.update(10.0, 0.0, 0.0);
        assert!(k1.px.is_finite() && k1.vx.is_finite());
        let k2 = predictor.update(20.0, 0.0, 5000.0);
        assert!(k2.px.is_finite() && k2.vx.is_finite() && !k2.v_sq.is_nan());
    }

    #[test]
    fn straight_approach_scores_ahead_and_zeroes_behind() {
        let mut predictor = predictor();
        predictor.reset(0.0, 0.0);
        for i in 1..=10 {
            predictor.update(10.0 * f64::from(i), 0.0, 16.67);
        }
        assert!(predictor.hint(30.0, 0.0, 400.0) > 0.3);
        assert_eq!(predictor.hint(-50.0, 0.0, 400.0), 0.0);
    }

    #[test]
    fn cone_narrows_with_speed() {
        let mut slow = predictor();
        slow.reset(0.0, 0.0);
        for _ in 0..10 {
            slow.update(slow_pos(&mut 0.0, 3.0), 0.0, 16.67);
        }
        let mut fast = predictor();
        fast.reset(0.0, 0.0);
        let mut pos = 0.0;
        for _ in 0..10 {
            pos += 20.0;
            fast.update(pos, 0.0, 16.67);
        }
        let score_slow = slow.hint(20.0, 15.0, 400.0);
        let score_fast = fast.hint(20.0, 15.0, 400.0);
        assert!(score_fast <= score_slow);
    }

    fn slow_pos(acc: &mut f64, step: f64) -> f64 {
        *acc += step;
        *acc
    }

    #[test]
    fn zero_velocity_uses_low_speed_rules() {
        let predictor = predictor();
        assert_eq!(predictor.hint(10.0, 10.0, 400.0), 1.0);
        assert_eq!(predictor.hint(1000.0, 1000.0, 400.0), 0.0);
    }

    proptest! {
        #[test]
        fn hint_is_always_in_unit_interval(
            dx in -2000.0f64..2000.0,
            dy in -2000.0f64..2000.0,
            mx in -500.0f64..500.0,
            my in -500.0f64..500.0,
            dt in 0.0f64..2000.0,
        ) {
            let mut predictor = predictor();
            predictor.reset(0.0, 0.0);
            predictor.update(mx, my, dt);
            let score = predictor.hint(dx, dy, 400.0);
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert!(!score.is_nan());
        }
    }
}
