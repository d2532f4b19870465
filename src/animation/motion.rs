//! Screen geometry, easing curves and timed motion segments

use std::f64::consts::PI;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn at(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Shrinks the rect by `margin` on every side
    pub fn inset(&self, margin: i32) -> Self {
        Self::new(
            self.x + margin,
            self.y + margin,
            (self.width - 2 * margin).max(0),
            (self.height - 2 * margin).max(0),
        )
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Range of top-left positions that keep an object of `size` inside `area`
/// with `margin` to spare. Degenerates to the minimum when the area is too
/// small.
pub fn position_bounds(size: Size, area: Rect, margin: i32) -> (Point, Point) {
    let min = Point::new(area.x + margin, area.y + margin);
    let max = Point::new(
        (area.right() - size.width - margin).max(min.x),
        (area.bottom() - size.height - margin).max(min.y),
    );
    (min, max)
}

pub fn clamp_into(position: Point, size: Size, area: Rect, margin: i32) -> Point {
    let (min, max) = position_bounds(size, area, margin);
    Point::new(position.x.clamp(min.x, max.x), position.y.clamp(min.y, max.y))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InOutSine,
    OutBounce,
}

impl Easing {
    /// Maps linear progress `t` in `[0, 1]` onto the curve
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::InQuad => t * t,
            Easing::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::InOutSine => -((PI * t).cos() - 1.0) / 2.0,
            Easing::OutBounce => out_bounce(t),
        }
    }
}

fn out_bounce(t: f64) -> f64 {
    const N1: f64 = 7.5625;
    const D1: f64 = 2.75;
    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984375
    }
}

/// How window opacity evolves across one segment
#[derive(Debug, Clone, PartialEq)]
pub enum Opacity {
    Constant(f32),
    Ramp { from: f32, to: f32 },
    /// `(progress, opacity)` pairs, progress ascending from 0.0 to 1.0
    Keyframes(Vec<(f64, f32)>),
}

impl Opacity {
    fn at(&self, t: f64) -> f32 {
        match self {
            Opacity::Constant(v) => *v,
            Opacity::Ramp { from, to } => from + (to - from) * t as f32,
            Opacity::Keyframes(frames) => {
                let Some(&(_, first)) = frames.first() else {
                    return 1.0;
                };
                let mut previous = (0.0, first);
                for &(at, value) in frames {
                    if t <= at {
                        let span = at - previous.0;
                        if span <= f64::EPSILON {
                            return value;
                        }
                        let local = ((t - previous.0) / span) as f32;
                        return previous.1 + (value - previous.1) * local;
                    }
                    previous = (at, value);
                }
                previous.1
            }
        }
    }
}

/// A single timed move from one point to another
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration: Duration,
    pub from: Point,
    pub to: Point,
    pub easing: Easing,
    pub opacity: Opacity,
}

/// Where the pet is drawn and how opaque it is at some instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Point,
    pub opacity: f32,
}

/// Sequence of segments played back to back
#[derive(Debug, Clone, PartialEq)]
pub struct Motion {
    segments: Vec<Segment>,
}

impl Motion {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Free walk: eased displacement over two seconds
    pub fn walk(from: Point, dx: i32, dy: i32) -> Self {
        Self::new(vec![Segment {
            duration: Duration::from_millis(2000),
            from,
            to: from.offset(dx, dy),
            easing: Easing::InOutSine,
            opacity: Opacity::Constant(1.0),
        }])
    }

    /// Rise by `height` and land back on the starting point
    pub fn jump(from: Point, height: i32, duration: Duration) -> Self {
        let half = duration / 2;
        let apex = from.offset(0, -height);
        Self::new(vec![
            Segment {
                duration: half,
                from,
                to: apex,
                easing: Easing::OutQuad,
                opacity: Opacity::Constant(1.0),
            },
            Segment {
                duration: half,
                from: apex,
                to: from,
                easing: Easing::InQuad,
                opacity: Opacity::Constant(1.0),
            },
        ])
    }

    pub fn hold(at: Point, duration: Duration) -> Self {
        Self::new(vec![Segment {
            duration,
            from: at,
            to: at,
            easing: Easing::Linear,
            opacity: Opacity::Constant(1.0),
        }])
    }

    pub fn bounce(from: Point, to: Point) -> Self {
        Self::new(vec![Segment {
            duration: Duration::from_millis(800),
            from,
            to,
            easing: Easing::OutBounce,
            opacity: Opacity::Constant(1.0),
        }])
    }

    /// Fade out, jump while invisible, fade back in
    pub fn teleport(from: Point, to: Point, fade: Duration) -> Self {
        Self::new(vec![
            Segment {
                duration: fade,
                from,
                to: from,
                easing: Easing::Linear,
                opacity: Opacity::Ramp { from: 1.0, to: 0.0 },
            },
            Segment {
                duration: Duration::ZERO,
                from,
                to,
                easing: Easing::Linear,
                opacity: Opacity::Constant(0.0),
            },
            Segment {
                duration: fade,
                from: to,
                to,
                easing: Easing::Linear,
                opacity: Opacity::Ramp { from: 0.0, to: 1.0 },
            },
        ])
    }

    /// Short glide with the pet dimmed through the middle of the move
    pub fn fade_reappear(from: Point, to: Point) -> Self {
        Self::new(vec![Segment {
            duration: Duration::from_millis(1000),
            from,
            to,
            easing: Easing::InOutQuad,
            opacity: Opacity::Keyframes(vec![(0.0, 1.0), (0.3, 0.2), (0.7, 0.2), (1.0, 1.0)]),
        }])
    }

    pub fn duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    pub fn start_position(&self) -> Option<Point> {
        self.segments.first().map(|s| s.from)
    }

    pub fn end_position(&self) -> Option<Point> {
        self.segments.last().map(|s| s.to)
    }

    /// Pose `elapsed` into the motion; past the end it holds the final pose.
    pub fn sample(&self, elapsed: Duration) -> Option<Pose> {
        let mut remaining = elapsed;
        for (i, segment) in self.segments.iter().enumerate() {
            let last = i + 1 == self.segments.len();
            if remaining < segment.duration || (last && segment.duration.is_zero()) {
                let t = if segment.duration.is_zero() {
                    1.0
                } else {
                    remaining.as_secs_f64() / segment.duration.as_secs_f64()
                };
                return Some(segment.pose(t));
            }
            if last {
                return Some(segment.pose(1.0));
            }
            remaining -= segment.duration;
        }
        None
    }
}

impl Segment {
    fn pose(&self, t: f64) -> Pose {
        let eased = self.easing.apply(t);
        let lerp = |a: i32, b: i32| (a as f64 + (b as f64 - a as f64) * eased).round() as i32;
        Pose {
            position: Point::new(lerp(self.from.x, self.to.x), lerp(self.from.y, self.to.y)),
            opacity: self.opacity.at(t),
        }
    }
}
