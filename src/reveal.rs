use crate::{
    mirror::StateMirror,
    model::{
        FinalResult,
        MatchView,
        RevealLabel,
        RoundRecord,
        result_scores,
    },
};
use std::{
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
    time,
};
use tracing::{
    debug,
    info,
};

const WOBBLE_STEPS: usize = 7;
const WOBBLE_DEGREES: i32 = 10;

#[derive(Clone, Copy, Debug)]
pub struct RevealTimings {
    pub wobble_step: Duration,
    pub hold: Duration,
}

impl Default for RevealTimings {
    fn default() -> Self {
        Self {
            wobble_step: Duration::from_millis(200),
            hold: Duration::from_millis(2000),
        }
    }
}

/// What the presentation layer should draw for the current reveal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnimationState {
    pub round: Option<u32>,
    pub rotate: i32,
    pub show: bool,
    pub reset: bool,
    pub label: Option<RevealLabel>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealEvent {
    Finished { round: u32 },
    NavigateToResult(FinalResult),
}

/// Plays the reveal timeline for each newly observed round record.
pub struct RevealAnimator {
    mirror: StateMirror,
    timings: RevealTimings,
    frames: watch::Sender<AnimationState>,
    events: mpsc::UnboundedSender<RevealEvent>,
    last_animated_round: Option<u32>,
    match_id: Option<String>,
    navigated: Arc<AtomicBool>,
    current: Option<JoinHandle<()>>,
}

impl RevealAnimator {
    pub fn new(
        mirror: StateMirror,
        timings: RevealTimings,
    ) -> (Self, mpsc::UnboundedReceiver<RevealEvent>) {
        let (frames, _) = watch::channel(AnimationState::default());
        let (events, events_rx) = mpsc::unbounded_channel();
        let animator = Self {
            mirror,
            timings,
            frames,
            events,
            last_animated_round: None,
            match_id: None,
            navigated: Arc::new(AtomicBool::new(false)),
            current: None,
        };
        (animator, events_rx)
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<AnimationState> {
        self.frames.subscribe()
    }

    pub fn last_animated_round(&self) -> Option<u32> {
        self.last_animated_round
    }

    pub fn is_animating(&self) -> bool {
        self.current.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Reacts to a new mirror value: starts a reveal for an unseen round, or
    /// navigates to the result once the match is over and nothing is left to
    /// reveal. Returns true when a reveal was started.
    pub async fn observe(&mut self, view: &MatchView) -> bool {
        self.track_match(view.match_id());

        if let Some(record) = &view.last_round_record
            && self.last_animated_round != Some(record.round)
        {
            self.start(record, view).await;
            return true;
        }

        if view.is_ended() && !self.is_animating() {
            let result = result_scores(self.mirror.final_result().as_ref(), view);
            if !self.navigated.swap(true, Ordering::AcqRel) {
                info!(?result, "match ended; showing result");
                let _ = self.events.send(RevealEvent::NavigateToResult(result));
            }
        }
        false
    }

    fn track_match(&mut self, match_id: Option<&str>) {
        let Some(match_id) = match_id else {
            return;
        };
        if self.match_id.as_deref() == Some(match_id) {
            return;
        }
        if self.match_id.is_some() {
            debug!(%match_id, "new match; clearing reveal history");
            self.last_animated_round = None;
            self.navigated.store(false, Ordering::Release);
        }
        self.match_id = Some(match_id.to_string());
    }

    async fn cancel_current(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
            let _ = task.await;
        }
    }

    async fn start(&mut self, record: &RoundRecord, view: &MatchView) {
        self.cancel_current().await;
        self.last_animated_round = Some(record.round);
        let label = record.outcome.label_for(view.is_host);
        debug!(round = record.round, %label, "revealing round");
        let reveal = Reveal {
            round: record.round,
            label,
            terminal: view.final_result(),
            timings: self.timings,
            frames: self.frames.clone(),
            events: self.events.clone(),
            mirror: self.mirror.clone(),
            navigated: self.navigated.clone(),
        };
        self.current = Some(tokio::spawn(reveal.run()));
    }
}

impl Drop for RevealAnimator {
    fn drop(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
        }
    }
}

struct Reveal {
    round: u32,
    label: RevealLabel,
    terminal: Option<FinalResult>,
    timings: RevealTimings,
    frames: watch::Sender<AnimationState>,
    events: mpsc::UnboundedSender<RevealEvent>,
    mirror: StateMirror,
    navigated: Arc<AtomicBool>,
}

impl Reveal {
    async fn run(self) {
        let round = Some(self.round);
        for step in 0..WOBBLE_STEPS {
            let rotate = if step % 2 == 0 {
                WOBBLE_DEGREES
            } else {
                -WOBBLE_DEGREES
            };
            self.frames.send_replace(AnimationState {
                round,
                rotate,
                ..AnimationState::default()
            });
            time::sleep(self.timings.wobble_step).await;
        }

        self.frames.send_replace(AnimationState {
            round,
            show: true,
            label: Some(self.label),
            ..AnimationState::default()
        });
        time::sleep(self.timings.hold).await;

        self.frames.send_replace(AnimationState {
            round,
            reset: true,
            ..AnimationState::default()
        });
        let _ = self.events.send(RevealEvent::Finished { round: self.round });

        let Some(result) = self.terminal else {
            return;
        };
        self.mirror.record_final_result(result.clone());
        if !self.navigated.swap(true, Ordering::AcqRel) {
            info!(?result, "final round revealed; showing result");
            let _ = self.events.send(RevealEvent::NavigateToResult(result));
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::view_json;

    fn view(my: u32, opp: u32, round: Option<u32>) -> MatchView {
        serde_json::from_value(view_json(my, opp, round)).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RevealEvent>) -> Vec<RevealEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    const FULL_REVEAL: Duration = Duration::from_millis(7 * 200 + 2000 + 50);

    #[tokio::test(start_paused = true)]
    async fn observe__same_round_animates_once() {
        // given
        let (mut animator, mut events) =
            RevealAnimator::new(StateMirror::new(), RevealTimings::default());
        let v = view(1, 0, Some(1));

        // when
        let first = animator.observe(&v).await;
        let second = animator.observe(&v).await;
        time::sleep(FULL_REVEAL).await;
        let third = animator.observe(&v).await;

        // then
        assert!(first);
        assert!(!second);
        assert!(!third);
        assert_eq!(drain(&mut events), vec![RevealEvent::Finished { round: 1 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn observe__shows_label_after_wobble() {
        // given
        let (mut animator, _events) =
            RevealAnimator::new(StateMirror::new(), RevealTimings::default());
        let frames = animator.subscribe_frames();

        // when
        animator.observe(&view(1, 0, Some(1))).await;
        time::sleep(Duration::from_millis(100)).await;
        let wobbling = frames.borrow().clone();
        time::sleep(Duration::from_millis(7 * 200)).await;
        let revealed = frames.borrow().clone();

        // then
        assert_eq!(wobbling.rotate, 10);
        assert!(!wobbling.show);
        assert!(revealed.show);
        assert_eq!(revealed.label, Some(RevealLabel::Win));
    }

    #[tokio::test(start_paused = true)]
    async fn observe__new_round_cancels_running_reveal() {
        // given
        let (mut animator, mut events) =
            RevealAnimator::new(StateMirror::new(), RevealTimings::default());
        animator.observe(&view(1, 0, Some(1))).await;
        time::sleep(Duration::from_millis(300)).await;

        // when
        animator.observe(&view(2, 0, Some(2))).await;
        time::sleep(FULL_REVEAL).await;

        // then
        assert_eq!(drain(&mut events), vec![RevealEvent::Finished { round: 2 }]);
        assert_eq!(animator.last_animated_round(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn observe__terminal_round_records_result_and_navigates_once() {
        // given
        let mirror = StateMirror::new();
        let (mut animator, mut events) =
            RevealAnimator::new(mirror.clone(), RevealTimings::default());
        let terminal = view(3, 1, Some(4));

        // when
        animator.observe(&terminal).await;
        time::sleep(FULL_REVEAL).await;
        animator.observe(&terminal).await;

        // then
        let expected = FinalResult {
            match_id: Some("match-1".into()),
            my_score: 3,
            opponent_score: 1,
        };
        assert_eq!(
            drain(&mut events),
            vec![
                RevealEvent::Finished { round: 4 },
                RevealEvent::NavigateToResult(expected.clone()),
            ]
        );
        assert_eq!(mirror.final_result(), Some(expected));
    }

    #[tokio::test(start_paused = true)]
    async fn observe__ended_by_status_navigates_without_round() {
        // given
        let (mut animator, mut events) =
            RevealAnimator::new(StateMirror::new(), RevealTimings::default());
        let mut ended = view(1, 2, None);
        ended.match_status = Some(crate::model::MatchStatus::Ended);
        if let Some(game) = ended.game.as_mut() {
            game.status = crate::model::MatchStatus::Ended;
        }

        // when
        let started = animator.observe(&ended).await;
        animator.observe(&ended).await;

        // then
        assert!(!started);
        let events = drain(&mut events);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RevealEvent::NavigateToResult(r) if r.my_score == 1 && r.opponent_score == 2
        ));
    }
}
