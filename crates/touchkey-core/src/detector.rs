use crate::config::TrackerParams;
use crate::layout::{KeyRef, KeyboardLayout};
use std::sync::Arc;

/// How a detector picks a key for a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPolicy {
    /// Candidates from the spatial index whose hit box contains the point;
    /// nearest edge wins, ties go to the higher code.
    HitBox,
    /// Popup panels: every key is a candidate if its edge lies within the
    /// slide allowance. The allowance doubles above the panel's top edge.
    SlideAllowance { allowance: i32 },
}

/// Stateless-per-call hit testing against one layout.
#[derive(Debug, Clone)]
pub struct KeyDetector {
    layout: Option<Arc<KeyboardLayout>>,
    correction_x: i32,
    correction_y: i32,
    hysteresis_sq: i32,
    hysteresis_sliding_sq: i32,
    policy: DetectorPolicy,
}

impl KeyDetector {
    pub fn new(key_hysteresis_distance: i32, key_hysteresis_distance_for_sliding_modifier: i32) -> Self {
        Self {
            layout: None,
            correction_x: 0,
            correction_y: 0,
            hysteresis_sq: key_hysteresis_distance * key_hysteresis_distance,
            hysteresis_sliding_sq: key_hysteresis_distance_for_sliding_modifier
                * key_hysteresis_distance_for_sliding_modifier,
            policy: DetectorPolicy::HitBox,
        }
    }

    pub fn from_params(params: &TrackerParams) -> Self {
        let mut detector = Self::new(
            params.key_hysteresis_distance,
            params.key_hysteresis_distance_for_sliding_modifier,
        );
        detector.correction_x = params.key_detector_correction.0;
        detector.correction_y = params.key_detector_correction.1;
        detector
    }

    /// Detector for popup panels. No hysteresis: any slide is a key change.
    pub fn for_more_keys(slide_allowance: i32) -> Self {
        Self {
            policy: DetectorPolicy::SlideAllowance {
                allowance: slide_allowance,
            },
            ..Self::new(0, 0)
        }
    }

    pub fn set_layout(&mut self, layout: Arc<KeyboardLayout>) {
        self.layout = Some(layout);
    }

    pub fn set_correction(&mut self, x: i32, y: i32) {
        self.correction_x = x;
        self.correction_y = y;
    }

    pub fn layout(&self) -> Option<&Arc<KeyboardLayout>> {
        self.layout.as_ref()
    }

    /// True when `layout` is the one this detector tests against.
    pub fn is_layout(&self, layout: &Arc<KeyboardLayout>) -> bool {
        self.layout.as_ref().map_or(false, |own| Arc::ptr_eq(own, layout))
    }

    pub fn policy(&self) -> DetectorPolicy {
        self.policy
    }

    pub fn touch_x(&self, x: i32) -> i32 {
        x + self.correction_x
    }

    pub fn touch_y(&self, y: i32) -> i32 {
        y + self.correction_y
    }

    pub fn key_hysteresis_sq(&self, sliding_from_modifier: bool) -> i32 {
        if sliding_from_modifier {
            self.hysteresis_sliding_sq
        } else {
            self.hysteresis_sq
        }
    }

    /// Popup panels let the finger wander between keys freely.
    pub fn always_allows_drag_selection(&self) -> bool {
        matches!(self.policy, DetectorPolicy::SlideAllowance { .. })
    }

    pub fn detect_hit_key(&self, x: i32, y: i32) -> Option<KeyRef> {
        let layout = self.layout.as_ref()?;
        let tx = self.touch_x(x);
        let ty = self.touch_y(y);
        let id = match self.policy {
            DetectorPolicy::HitBox => Self::nearest_in_hit_box(layout, tx, ty),
            DetectorPolicy::SlideAllowance { allowance } => {
                let square = allowance * allowance;
                // Sliding above the panel is measured against a wider band.
                let limit = if y < 0 { square * 2 } else { square };
                Self::nearest_within(layout, tx, ty, limit)
            }
        }?;
        KeyRef::new(layout.clone(), id)
    }

    fn nearest_in_hit_box(layout: &KeyboardLayout, x: i32, y: i32) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for &id in layout.nearest_keys(x, y) {
            let Some(key) = layout.key(id) else { continue };
            if !key.is_on_key(x, y) {
                continue;
            }
            let dist = key.squared_distance_to_edge(x, y);
            let better = match best {
                None => true,
                Some((best_id, best_dist)) => {
                    dist < best_dist
                        || (dist == best_dist
                            && layout.key(best_id).map_or(true, |b| key.code > b.code))
                }
            };
            if better {
                best = Some((id, dist));
            }
        }
        best.map(|(id, _)| id)
    }

    fn nearest_within(layout: &KeyboardLayout, x: i32, y: i32, limit: i32) -> Option<usize> {
        let mut nearest = None;
        let mut nearest_dist = limit;
        for (id, key) in layout.keys().iter().enumerate() {
            if key.is_spacer() {
                continue;
            }
            let dist = key.squared_distance_to_edge(x, y);
            if dist < nearest_dist {
                nearest = Some(id);
                nearest_dist = dist;
            }
        }
        nearest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyGeometry;
    use crate::layout::LayoutParams;
    use crate::types::Rect;

    fn layout(keys: Vec<KeyGeometry>) -> Arc<KeyboardLayout> {
        let params = LayoutParams {
            width: 300,
            height: 100,
            ..LayoutParams::default()
        };
        Arc::new(KeyboardLayout::from_keys(params, keys).unwrap())
    }

    fn detector(layout: Arc<KeyboardLayout>) -> KeyDetector {
        let mut d = KeyDetector::new(10, 0);
        d.set_layout(layout);
        d
    }

    #[test]
    fn test_point_inside_single_hit_box() {
        let l = layout(vec![
            KeyGeometry::letter('a', Rect::from_xywh(0, 0, 100, 100)),
            KeyGeometry::letter('b', Rect::from_xywh(110, 0, 100, 100)),
        ]);
        let d = detector(l);
        assert_eq!(d.detect_hit_key(50, 50).map(|k| k.code), Some('a' as i32));
        assert_eq!(d.detect_hit_key(150, 50).map(|k| k.code), Some('b' as i32));
        // Gap between the two keys belongs to nobody.
        assert_eq!(d.detect_hit_key(105, 50), None);
        assert_eq!(d.detect_hit_key(250, 50), None);
    }

    #[test]
    fn test_tie_goes_to_higher_code() {
        // Hit boxes overlap by the extra right pixel; at x=100 both edges are
        // at distance zero.
        let l = layout(vec![
            KeyGeometry::letter('b', Rect::from_xywh(0, 0, 100, 100)),
            KeyGeometry::letter('a', Rect::from_xywh(100, 0, 100, 100)),
        ]);
        let d = detector(l);
        for _ in 0..3 {
            assert_eq!(d.detect_hit_key(100, 50).map(|k| k.code), Some('b' as i32));
        }

        let l = layout(vec![
            KeyGeometry::letter('a', Rect::from_xywh(0, 0, 100, 100)),
            KeyGeometry::letter('b', Rect::from_xywh(100, 0, 100, 100)),
        ]);
        let d = detector(l);
        assert_eq!(d.detect_hit_key(100, 50).map(|k| k.code), Some('b' as i32));
    }

    #[test]
    fn test_correction_offsets_the_point() {
        let l = layout(vec![
            KeyGeometry::letter('a', Rect::from_xywh(0, 0, 100, 100)),
            KeyGeometry::letter('b', Rect::from_xywh(100, 0, 100, 100)),
        ]);
        let mut d = detector(l);
        d.set_correction(60, 0);
        assert_eq!(d.detect_hit_key(50, 50).map(|k| k.code), Some('b' as i32));
    }

    #[test]
    fn test_slide_allowance_reaches_outside_keys() {
        let l = layout(vec![
            KeyGeometry::letter('1', Rect::from_xywh(0, 0, 50, 50)),
            KeyGeometry::divider(50, 0, 10, 50),
            KeyGeometry::letter('2', Rect::from_xywh(60, 0, 50, 50)),
        ]);
        let mut d = KeyDetector::for_more_keys(20);
        d.set_layout(l);
        assert!(d.always_allows_drag_selection());
        // Below the panel, within the allowance.
        assert_eq!(d.detect_hit_key(20, 65).map(|k| k.code), Some('1' as i32));
        // Too far below.
        assert_eq!(d.detect_hit_key(20, 75), None);
        // Above the top the allowance is doubled: 25^2 < 2 * 20^2.
        assert_eq!(d.detect_hit_key(80, -25).map(|k| k.code), Some('2' as i32));
        assert_eq!(d.detect_hit_key(80, -30), None);
        // The divider is skipped: the point lies on it, yet '1' is nearest.
        assert_eq!(d.detect_hit_key(52, 10).map(|k| k.code), Some('1' as i32));
    }

    #[test]
    fn test_hysteresis_by_mode() {
        let d = KeyDetector::new(10, 4);
        assert_eq!(d.key_hysteresis_sq(false), 100);
        assert_eq!(d.key_hysteresis_sq(true), 16);
        assert!(!d.always_allows_drag_selection());
        assert_eq!(KeyDetector::for_more_keys(5).key_hysteresis_sq(false), 0);
    }

    #[test]
    fn test_hysteresis_from_params() {
        let params = TrackerParams {
            key_hysteresis_distance: 10,
            key_hysteresis_distance_for_sliding_modifier: 15,
            ..TrackerParams::default()
        };
        let d = KeyDetector::from_params(&params);
        assert_eq!(d.key_hysteresis_sq(false), 100);
        assert_eq!(d.key_hysteresis_sq(true), 225);

        let params: TrackerParams =
            serde_json::from_str(r#"{ "key_hysteresis_distance": 5 }"#).unwrap();
        assert_eq!(KeyDetector::from_params(&params).key_hysteresis_sq(false), 25);
    }
}
