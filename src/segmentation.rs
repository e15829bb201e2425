//! Plot segmentation state machine.
//!
//! ```text
//! Idle --mark_start--> AwaitingEnd --mark_end--> Committing --succeeded--> Idle
//!                        ^    |                     ^    |
//!                        |    +--> SelectingDirection     +--failed--> AwaitingEnd
//!                        +--dismiss--+
//! ```
//!
//! `SelectingDirection` is only entered when no direction has been
//! established for the directory yet, or the registry is empty. Otherwise
//! the remembered direction is reused.

use crate::error::SessionError;
use crate::model::{PlotSegment, StitchDirection};

/// Current segmentation step.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SegmentState {
    /// Waiting for a start image.
    #[default]
    Idle,
    /// Start marked, waiting for the end image.
    AwaitingEnd { start: String },
    /// End marked, waiting for the operator to pick a direction.
    SelectingDirection { start: String, end: String },
    /// Draft handed to the backend, waiting for the outcome.
    Committing { draft: PlotDraft },
}

impl SegmentState {
    pub fn name(&self) -> &'static str {
        match self {
            SegmentState::Idle => "idle",
            SegmentState::AwaitingEnd { .. } => "awaiting end",
            SegmentState::SelectingDirection { .. } => "selecting direction",
            SegmentState::Committing { .. } => "committing",
        }
    }
}

/// A plot ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotDraft {
    pub plot_index: u32,
    pub start_image: String,
    pub end_image: String,
    pub stitch_direction: StitchDirection,
    pub shift_all: bool,
}

impl PlotDraft {
    pub fn to_segment(&self, camera_id: impl Into<String>) -> PlotSegment {
        PlotSegment::new(
            self.plot_index,
            self.start_image.clone(),
            self.end_image.clone(),
            self.stitch_direction,
        )
        .with_camera(camera_id)
        .with_shift_all(self.shift_all)
    }
}

/// Result of [`SegmentationMachine::mark_end`].
#[derive(Debug, Clone, PartialEq)]
pub enum EndMark {
    /// Direction known; the draft is ready to commit.
    Ready(PlotDraft),
    /// The operator must choose a direction first.
    NeedsDirection,
}

/// Start/end marking with direction memory and index suggestion.
#[derive(Debug, Clone, Default)]
pub struct SegmentationMachine {
    state: SegmentState,
    remembered_direction: Option<StitchDirection>,
    suggested_index: u32,
    /// Applies to the next commit only
    shift_all: bool,
}

impl SegmentationMachine {
    pub fn new(suggested_index: u32) -> Self {
        Self {
            suggested_index,
            ..Default::default()
        }
    }

    /// Reuse the direction of plots marked in an earlier session.
    pub fn with_remembered_direction(mut self, direction: Option<StitchDirection>) -> Self {
        self.remembered_direction = direction;
        self
    }

    pub fn state(&self) -> &SegmentState {
        &self.state
    }

    pub fn suggested_index(&self) -> u32 {
        self.suggested_index
    }

    /// Override the index the next plot will get.
    pub fn set_suggested_index(&mut self, index: u32) {
        self.suggested_index = index;
    }

    pub fn remembered_direction(&self) -> Option<StitchDirection> {
        self.remembered_direction
    }

    pub fn shift_all(&self) -> bool {
        self.shift_all
    }

    pub fn set_shift_all(&mut self, shift_all: bool) {
        self.shift_all = shift_all;
    }

    /// Draft awaiting the backend, if any.
    pub fn pending_commit(&self) -> Option<&PlotDraft> {
        match &self.state {
            SegmentState::Committing { draft } => Some(draft),
            _ => None,
        }
    }

    pub fn mark_start(&mut self, image: &str) -> Result<(), SessionError> {
        if self.state != SegmentState::Idle {
            return Err(SessionError::invalid_segment("mark start", self.state.name()));
        }
        log::debug!("Segmentation: start at {}", image);
        self.state = SegmentState::AwaitingEnd {
            start: image.to_string(),
        };
        Ok(())
    }

    /// Mark the end image.
    ///
    /// An `explicit` direction is used as given. Without one, the remembered
    /// direction is reused when the registry already holds plots; otherwise
    /// the machine waits in `SelectingDirection`.
    pub fn mark_end(
        &mut self,
        image: &str,
        explicit: Option<StitchDirection>,
        registry_empty: bool,
    ) -> Result<EndMark, SessionError> {
        let SegmentState::AwaitingEnd { start } = &self.state else {
            return Err(SessionError::invalid_segment("mark end", self.state.name()));
        };
        let start = start.clone();

        let direction = explicit.or_else(|| self.remembered_direction.filter(|_| !registry_empty));

        match direction {
            Some(direction) => {
                let draft = self.begin_commit(start, image.to_string(), direction);
                Ok(EndMark::Ready(draft))
            }
            None => {
                log::debug!("Segmentation: direction required for {}..{}", start, image);
                self.state = SegmentState::SelectingDirection {
                    start,
                    end: image.to_string(),
                };
                Ok(EndMark::NeedsDirection)
            }
        }
    }

    /// Answer the direction prompt.
    pub fn choose_direction(
        &mut self,
        direction: StitchDirection,
    ) -> Result<PlotDraft, SessionError> {
        let SegmentState::SelectingDirection { start, end } = &self.state else {
            return Err(SessionError::invalid_segment(
                "choose direction",
                self.state.name(),
            ));
        };
        let (start, end) = (start.clone(), end.clone());
        Ok(self.begin_commit(start, end, direction))
    }

    /// Close the direction prompt without choosing; the start stays marked.
    pub fn dismiss_direction(&mut self) -> Result<(), SessionError> {
        let SegmentState::SelectingDirection { start, .. } = &self.state else {
            return Err(SessionError::invalid_segment(
                "dismiss direction",
                self.state.name(),
            ));
        };
        self.state = SegmentState::AwaitingEnd {
            start: start.clone(),
        };
        Ok(())
    }

    /// Discard the marked start.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, SegmentState::AwaitingEnd { .. }) {
            return Err(SessionError::invalid_segment("cancel", self.state.name()));
        }
        log::debug!("Segmentation: cancelled");
        self.state = SegmentState::Idle;
        Ok(())
    }

    fn begin_commit(
        &mut self,
        start_image: String,
        end_image: String,
        stitch_direction: StitchDirection,
    ) -> PlotDraft {
        let draft = PlotDraft {
            plot_index: self.suggested_index,
            start_image,
            end_image,
            stitch_direction,
            shift_all: self.shift_all,
        };
        self.state = SegmentState::Committing {
            draft: draft.clone(),
        };
        draft
    }

    /// The backend accepted the pending draft.
    pub fn commit_succeeded(&mut self) -> Result<PlotDraft, SessionError> {
        let draft = match std::mem::take(&mut self.state) {
            SegmentState::Committing { draft } => draft,
            other => {
                let name = other.name();
                self.state = other;
                return Err(SessionError::invalid_segment("finish commit", name));
            }
        };
        self.remembered_direction = Some(draft.stitch_direction);
        self.suggested_index = draft.plot_index.saturating_add(1);
        self.shift_all = false;
        log::debug!(
            "Segmentation: committed plot {}, next suggestion {}",
            draft.plot_index,
            self.suggested_index
        );
        Ok(draft)
    }

    /// The backend rejected the pending draft; go back to awaiting the end.
    pub fn commit_failed(&mut self) -> Result<(), SessionError> {
        let SegmentState::Committing { draft } = &self.state else {
            return Err(SessionError::invalid_segment("abort commit", self.state.name()));
        };
        self.state = SegmentState::AwaitingEnd {
            start: draft.start_image.clone(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_end_before_start_is_rejected() {
        let mut machine = SegmentationMachine::new(0);
        let err = machine.mark_end("img_010.jpg", None, true).unwrap_err();
        assert!(matches!(err, SessionError::InvalidSegmentState { .. }));
        assert_eq!(machine.state(), &SegmentState::Idle);
    }

    #[test]
    fn test_cancel_only_after_start() {
        let mut machine = SegmentationMachine::new(0);
        assert!(machine.cancel().is_err());

        machine.mark_start("img_001.jpg").unwrap();
        machine.cancel().unwrap();
        assert_eq!(machine.state(), &SegmentState::Idle);
        assert_eq!(machine.suggested_index(), 0);
    }

    #[test]
    fn test_double_start_is_rejected() {
        let mut machine = SegmentationMachine::new(0);
        machine.mark_start("a").unwrap();
        assert!(machine.mark_start("b").is_err());
        assert_eq!(
            machine.state(),
            &SegmentState::AwaitingEnd {
                start: "a".to_string()
            }
        );
    }

    #[test]
    fn test_first_plot_prompts_for_direction() {
        let mut machine = SegmentationMachine::new(1);
        machine.mark_start("img_010.jpg").unwrap();
        assert_eq!(
            machine.mark_end("img_040.jpg", None, true).unwrap(),
            EndMark::NeedsDirection
        );

        let draft = machine.choose_direction(StitchDirection::Down).unwrap();
        assert_eq!(draft.plot_index, 1);
        assert_eq!(draft.start_image, "img_010.jpg");
        assert_eq!(draft.end_image, "img_040.jpg");
        assert_eq!(machine.pending_commit(), Some(&draft));

        machine.commit_succeeded().unwrap();
        assert_eq!(machine.state(), &SegmentState::Idle);
        assert_eq!(machine.suggested_index(), 2);
        assert_eq!(machine.remembered_direction(), Some(StitchDirection::Down));
    }

    #[test]
    fn test_remembered_direction_reused_when_registry_non_empty() {
        let mut machine = SegmentationMachine::new(0);
        machine.mark_start("a").unwrap();
        machine.mark_end("b", Some(StitchDirection::Left), true).unwrap();
        machine.commit_succeeded().unwrap();

        machine.mark_start("c").unwrap();
        let EndMark::Ready(draft) = machine.mark_end("d", None, false).unwrap() else {
            panic!("expected remembered direction to be reused");
        };
        assert_eq!(draft.stitch_direction, StitchDirection::Left);
        assert_eq!(draft.plot_index, 1);
    }

    #[test]
    fn test_remembered_direction_ignored_when_registry_empty() {
        let mut machine = SegmentationMachine::new(0);
        machine.mark_start("a").unwrap();
        machine.mark_end("b", Some(StitchDirection::Up), true).unwrap();
        machine.commit_succeeded().unwrap();

        machine.mark_start("c").unwrap();
        assert_eq!(
            machine.mark_end("d", None, true).unwrap(),
            EndMark::NeedsDirection
        );
    }

    #[test]
    fn test_resumed_direction_skips_prompt() {
        let mut machine =
            SegmentationMachine::new(8).with_remembered_direction(Some(StitchDirection::Left));
        machine.mark_start("a").unwrap();
        let EndMark::Ready(draft) = machine.mark_end("b", None, false).unwrap() else {
            panic!("expected resumed direction to be reused");
        };
        assert_eq!(draft.stitch_direction, StitchDirection::Left);
        assert_eq!(draft.plot_index, 8);
    }

    #[test]
    fn test_suggestion_saturates_at_max_index() {
        let mut machine = SegmentationMachine::new(0);
        machine.set_suggested_index(u32::MAX);
        machine.mark_start("a").unwrap();
        machine.mark_end("b", Some(StitchDirection::Up), true).unwrap();
        assert_eq!(machine.commit_succeeded().unwrap().plot_index, u32::MAX);
        assert_eq!(machine.suggested_index(), u32::MAX);
    }

    #[test]
    fn test_same_start_and_end_is_allowed() {
        let mut machine = SegmentationMachine::new(0);
        machine.mark_start("a").unwrap();
        let EndMark::Ready(draft) = machine
            .mark_end("a", Some(StitchDirection::Up), true)
            .unwrap()
        else {
            panic!("expected ready draft");
        };
        assert_eq!(draft.start_image, draft.end_image);
    }

    #[test]
    fn test_shift_all_is_not_sticky() {
        let mut machine = SegmentationMachine::new(0);
        machine.set_shift_all(true);
        machine.mark_start("a").unwrap();
        let EndMark::Ready(draft) = machine
            .mark_end("b", Some(StitchDirection::Up), true)
            .unwrap()
        else {
            panic!("expected ready draft");
        };
        assert!(draft.shift_all);
        machine.commit_succeeded().unwrap();
        assert!(!machine.shift_all());
    }

    #[test]
    fn test_failed_commit_returns_to_awaiting_end() {
        let mut machine = SegmentationMachine::new(4);
        machine.set_shift_all(true);
        machine.mark_start("a").unwrap();
        machine.mark_end("b", Some(StitchDirection::Right), true).unwrap();
        machine.commit_failed().unwrap();

        assert_eq!(
            machine.state(),
            &SegmentState::AwaitingEnd {
                start: "a".to_string()
            }
        );
        assert_eq!(machine.suggested_index(), 4);
        assert_eq!(machine.remembered_direction(), None);
        assert!(machine.shift_all());
    }

    #[test]
    fn test_dismiss_direction_keeps_start() {
        let mut machine = SegmentationMachine::new(0);
        machine.mark_start("a").unwrap();
        machine.mark_end("b", None, true).unwrap();
        machine.dismiss_direction().unwrap();
        assert_eq!(
            machine.state(),
            &SegmentState::AwaitingEnd {
                start: "a".to_string()
            }
        );
    }

    #[test]
    fn test_commit_outside_committing_is_rejected() {
        let mut machine = SegmentationMachine::new(0);
        assert!(machine.commit_succeeded().is_err());
        assert!(machine.commit_failed().is_err());
        assert_eq!(machine.state(), &SegmentState::Idle);
    }
}
