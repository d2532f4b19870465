//! Cooperative animation driver.
//!
//! Everything here runs on the host's event loop. A transition is started by
//! one call and finished by `on_transition_done` once its motion has played;
//! the driver never sleeps itself, it hands back a [`Scheduled`] completion
//! that the host turns into a timer event. `is_animating` is the only guard
//! against overlapping transitions and is cleared on every exit path.

use super::motion::{clamp_into, position_bounds, Motion, Point, Pose, Rect, Size};
use super::{AnimationBindings, AnimationState, LoopHandle, LoopSource};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Margin the pet must keep from the screen edge to count as visible
pub const VISIBLE_MARGIN: i32 = 20;
/// Margin used when picking a fresh random position
pub const SAFE_MARGIN: i32 = 50;

const WALK_DISTANCE: std::ops::RangeInclusive<i32> = 50..=150;
const WALK_DRIFT: std::ops::RangeInclusive<i32> = -20..=20;
const JUMP_HEIGHT: i32 = 100;
const JUMP_DURATION: Duration = Duration::from_millis(800);
const TOUCH_DURATION: Duration = Duration::from_millis(1000);
const BOUNCE_DISTANCE: i32 = 50;
const REAPPEAR_OFFSET: i32 = 100;
const TELEPORT_FADE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Ambient,
    Interaction,
    Recovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Walk,
    PhoneWalk,
    Jump,
    Touch,
    Recovery(RecoveryStrategy),
}

impl TransitionKind {
    /// Transitions that move the pet freely and may leave the screen
    pub fn is_free_roam(self) -> bool {
        matches!(self, TransitionKind::Walk | TransitionKind::PhoneWalk | TransitionKind::Jump)
    }
}

/// Ways of bringing the pet back after it roamed off screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    BounceBack,
    Teleport,
    FadeAndReappear,
}

impl RecoveryStrategy {
    pub const ALL: [RecoveryStrategy; 3] = [
        RecoveryStrategy::BounceBack,
        RecoveryStrategy::Teleport,
        RecoveryStrategy::FadeAndReappear,
    ];
}

/// A completion the host must deliver back through `on_transition_done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub id: u64,
    pub after: Duration,
}

#[derive(Debug, Clone)]
struct Transition {
    id: u64,
    kind: TransitionKind,
    priority: Priority,
    motion: Motion,
    started_at: Instant,
}

/// Live state of the character on screen
#[derive(Debug, Clone)]
pub struct AnimationSession {
    pub looping: LoopHandle,
    pub is_animating: bool,
    pub position: Point,
    pub opacity: f32,
    pub pointer_enabled: bool,
    /// -1 facing left, 1 facing right
    pub direction: i32,
}

pub struct AnimationDriver<R = StdRng> {
    bindings: AnimationBindings,
    session: AnimationSession,
    transition: Option<Transition>,
    screen: Rect,
    pet_size: Size,
    enabled: bool,
    next_id: u64,
    rng: R,
}

impl AnimationDriver<StdRng> {
    pub fn new(bindings: AnimationBindings, screen: Rect, pet_size: Size) -> Self {
        let mut rng = StdRng::from_entropy();
        let (min, max) = position_bounds(pet_size, screen, 0);
        let start = Point::new(rng.gen_range(min.x..=max.x), rng.gen_range(min.y..=max.y));
        Self::with_rng(bindings, screen, pet_size, start, rng)
    }
}

impl<R: Rng> AnimationDriver<R> {
    pub fn with_rng(bindings: AnimationBindings, screen: Rect, pet_size: Size, start: Point, mut rng: R) -> Self {
        let direction = if rng.gen_bool(0.5) { -1 } else { 1 };
        let mut driver = Self {
            bindings,
            session: AnimationSession {
                looping: LoopHandle::start(AnimationState::Idle, LoopSource::Fallback),
                is_animating: false,
                position: start,
                opacity: 1.0,
                pointer_enabled: true,
                direction,
            },
            transition: None,
            screen,
            pet_size,
            enabled: true,
            next_id: 1,
            rng,
        };
        driver.play(AnimationState::Idle);
        driver
    }

    pub fn session(&self) -> &AnimationSession {
        &self.session
    }

    pub fn current_state(&self) -> AnimationState {
        self.session.looping.state()
    }

    pub fn is_animating(&self) -> bool {
        self.session.is_animating
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn in_flight(&self) -> Option<(TransitionKind, Priority)> {
        self.transition.as_ref().map(|t| (t.kind, t.priority))
    }

    pub fn screen(&self) -> Rect {
        self.screen
    }

    pub fn set_screen(&mut self, screen: Rect) {
        self.screen = screen;
    }

    /// Current pose, following the in-flight motion if there is one
    pub fn pose(&self) -> Pose {
        self.transition
            .as_ref()
            .and_then(|t| t.motion.sample(t.started_at.elapsed()))
            .unwrap_or(Pose {
                position: self.session.position,
                opacity: self.session.opacity,
            })
    }

    /// Shows `state`'s loop from the start. A missing resource degrades to
    /// the fallback visual.
    pub fn play(&mut self, state: AnimationState) {
        let source = match self.bindings.resolve(state) {
            Ok(path) => LoopSource::Resource(path.to_path_buf()),
            Err(missing) => {
                warn!("[animation] {}, using fallback", missing);
                LoopSource::Fallback
            }
        };
        debug!("[animation] play {}", state);
        self.session.looping = LoopHandle::start(state, source);
    }

    /// Starts a random free-roam transition when nothing else is playing.
    pub fn random_animation(&mut self) -> Option<Scheduled> {
        if self.session.is_animating || !self.enabled {
            return None;
        }
        let kind = match self.rng.gen_range(0..3) {
            0 => TransitionKind::Walk,
            1 => TransitionKind::PhoneWalk,
            _ => TransitionKind::Jump,
        };
        Some(self.begin(kind, Priority::Ambient))
    }

    /// Starts `kind`, preempting an in-flight transition only if `priority`
    /// is strictly higher.
    pub fn request_animation(&mut self, kind: TransitionKind, priority: Priority) -> Option<Scheduled> {
        if !self.enabled {
            return None;
        }
        if let Some(current) = &self.transition {
            if current.priority >= priority {
                debug!("[animation] dropped {:?}, {:?} still running", kind, current.kind);
                return None;
            }
            info!("[animation] {:?} preempts {:?}", kind, current.kind);
        }
        self.stop_current();
        Some(self.begin(kind, priority))
    }

    fn begin(&mut self, kind: TransitionKind, priority: Priority) -> Scheduled {
        let from = self.session.position;
        let (state, motion) = match kind {
            TransitionKind::Walk | TransitionKind::PhoneWalk => {
                let left = self.rng.gen_bool(0.5);
                self.session.direction = if left { -1 } else { 1 };
                let dx = self.rng.gen_range(WALK_DISTANCE) * self.session.direction;
                let dy = self.rng.gen_range(WALK_DRIFT);
                let state = match (kind, left) {
                    (TransitionKind::Walk, true) => AnimationState::WalkLeft,
                    (TransitionKind::Walk, false) => AnimationState::WalkRight,
                    (_, true) => AnimationState::PhoneWalkLeft,
                    (_, false) => AnimationState::PhoneWalkRight,
                };
                (state, Motion::walk(from, dx, dy))
            }
            TransitionKind::Jump => (AnimationState::Jump, Motion::jump(from, JUMP_HEIGHT, JUMP_DURATION)),
            TransitionKind::Touch => (AnimationState::Touch, Motion::hold(from, TOUCH_DURATION)),
            TransitionKind::Recovery(strategy) => {
                let motion = self.recovery_motion(strategy);
                (self.current_state(), motion)
            }
        };
        self.play(state);
        self.start(kind, priority, motion)
    }

    fn start(&mut self, kind: TransitionKind, priority: Priority, motion: Motion) -> Scheduled {
        let id = self.next_id;
        self.next_id += 1;
        let after = motion.duration();
        self.transition = Some(Transition {
            id,
            kind,
            priority,
            motion,
            started_at: Instant::now(),
        });
        self.session.is_animating = true;
        Scheduled { id, after }
    }

    /// Finishes the transition `id`. Stale ids (from interrupted or replaced
    /// transitions) are ignored. Returns the recovery completion to arm when
    /// the pet ended up off screen.
    pub fn on_transition_done(&mut self, id: u64) -> Option<Scheduled> {
        let transition = match self.transition.take() {
            Some(t) if t.id == id => t,
            other => {
                self.transition = other;
                debug!("[animation] ignoring stale completion {}", id);
                return None;
            }
        };

        if let Some(end) = transition.motion.end_position() {
            self.session.position = end;
        }
        self.session.opacity = 1.0;
        self.session.is_animating = false;

        if transition.kind.is_free_roam() && !self.is_visible() {
            let strategy = RecoveryStrategy::ALL[self.rng.gen_range(0..RecoveryStrategy::ALL.len())];
            info!(
                "[animation] pet left the screen at {:?}, recovering with {:?}",
                self.session.position, strategy
            );
            return Some(self.recover(strategy));
        }

        self.finish_idle();
        None
    }

    /// Runs `strategy` to bring the pet back on screen. Pointer input is
    /// ignored until it completes.
    pub fn recover(&mut self, strategy: RecoveryStrategy) -> Scheduled {
        self.transition = None;
        self.session.pointer_enabled = false;
        self.begin(TransitionKind::Recovery(strategy), Priority::Recovery)
    }

    fn recovery_motion(&mut self, strategy: RecoveryStrategy) -> Motion {
        let from = self.session.position;
        match strategy {
            RecoveryStrategy::BounceBack => {
                let (min, max) = position_bounds(self.pet_size, self.screen, VISIBLE_MARGIN);
                let mut target = from;
                if from.x <= min.x {
                    target.x = min.x + BOUNCE_DISTANCE;
                    self.session.direction = 1;
                } else if from.x >= max.x {
                    target.x = max.x - BOUNCE_DISTANCE;
                    self.session.direction = -1;
                }
                if from.y <= min.y {
                    target.y = min.y + BOUNCE_DISTANCE;
                } else if from.y >= max.y {
                    target.y = max.y - BOUNCE_DISTANCE;
                }
                let target = clamp_into(target, self.pet_size, self.screen, VISIBLE_MARGIN);
                Motion::bounce(from, target)
            }
            RecoveryStrategy::Teleport => {
                let target = self.random_safe_position();
                Motion::teleport(from, target, TELEPORT_FADE)
            }
            RecoveryStrategy::FadeAndReappear => {
                let nudged = from.offset(REAPPEAR_OFFSET * self.session.direction, 0);
                let target = clamp_into(nudged, self.pet_size, self.screen, VISIBLE_MARGIN);
                Motion::fade_reappear(from, target)
            }
        }
    }

    fn random_safe_position(&mut self) -> Point {
        let (min, max) = position_bounds(self.pet_size, self.screen, SAFE_MARGIN);
        Point::new(
            self.rng.gen_range(min.x..=max.x),
            self.rng.gen_range(min.y..=max.y),
        )
    }

    /// Pointer pressed on the pet. Cancels any in-flight transition and
    /// returns to idle; returns whether something was interrupted.
    pub fn pointer_down(&mut self) -> bool {
        if !self.session.is_animating {
            return false;
        }
        let pose = self.pose();
        self.transition = None;
        info!("[animation] click interrupted the current animation");
        self.session.position = if self.rect_visible(pose.position) {
            pose.position
        } else {
            clamp_into(pose.position, self.pet_size, self.screen, VISIBLE_MARGIN)
        };
        self.finish_idle();
        true
    }

    /// Moves the pet while it is being dragged. The pet may hang off the
    /// screen by at most its own size.
    pub fn drag_to(&mut self, position: Point) {
        if self.session.is_animating {
            self.stop_current();
        }
        let limits = Rect::new(
            self.screen.x.saturating_sub(self.pet_size.width),
            self.screen.y.saturating_sub(self.pet_size.height),
            self.screen.width.saturating_add(2 * self.pet_size.width),
            self.screen.height.saturating_add(2 * self.pet_size.height),
        );
        self.session.position = clamp_into(position, self.pet_size, limits, 0);
    }

    /// Stops every transition where it currently is, without changing the
    /// visible loop
    pub fn stop_current(&mut self) {
        if self.transition.is_some() {
            self.session.position = self.pose().position;
        }
        self.transition = None;
        self.session.is_animating = false;
        self.session.pointer_enabled = true;
        self.session.opacity = 1.0;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.stop_current();
        }
        self.play(AnimationState::Idle);
    }

    /// Watchdog: restarts the loop on its last state if it is no longer
    /// playing. Returns whether a restart happened.
    pub fn check_liveness(&mut self) -> bool {
        if self.session.looping.is_running() {
            return false;
        }
        let state = self.session.looping.state();
        warn!("[animation] loop for {} stalled, restarting", state);
        self.play(state);
        true
    }

    /// Called by the renderer when the visible loop stops on its own
    pub fn report_stalled(&mut self) {
        self.session.looping.stall();
    }

    pub fn is_visible(&self) -> bool {
        self.rect_visible(self.session.position)
    }

    fn rect_visible(&self, position: Point) -> bool {
        self.screen
            .inset(VISIBLE_MARGIN)
            .contains_rect(&Rect::at(position, self.pet_size))
    }

    #[cfg(test)]
    fn rewind_transition(&mut self, by: Duration) {
        if let Some(t) = self.transition.as_mut() {
            if let Some(earlier) = t.started_at.checked_sub(by) {
                t.started_at = earlier;
            }
        }
    }

    fn finish_idle(&mut self) {
        self.stop_current();
        self.play(AnimationState::Idle);
    }
}
