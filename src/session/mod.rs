//! Directory session: owns every per-directory component and drives them.
//!
//! The host calls [`Session::tick`] from its event loop. Each tick applies a
//! due cursor commit, drains finished lookups from the worker thread and
//! hands idle capacity to the prefetch queue. User actions (marking plots,
//! GPS alignment, mask saving) are plain method calls that talk to the
//! [`FieldService`] directly and return once the backend has answered.
//!
//! Two counters keep late results from landing in the wrong place. The
//! session epoch changes whenever a directory is opened, and the cache
//! generation changes on every invalidation. Results carrying an old value
//! of either are dropped.

use std::sync::Arc;
use std::time::Duration;

use web_time::Instant;

use crate::cache::{CacheKey, PlotIndexCache, Resolution};
use crate::constants::{
    COMMIT_DEBOUNCE, JUMP_STEP, METADATA_PREFETCH_RADIUS, PLOT_CACHE_CAPACITY,
    PREFETCH_MAX_IN_FLIGHT,
};
use crate::crop::{CropEditor, ImageLayout};
use crate::error::SessionError;
use crate::gps::GpsAlignment;
use crate::model::{
    CropMask, DirectoryKey, GpsShift, LatLon, PlotMembership, PlotSegment, StitchDirection,
};
use crate::navigator::ImageNavigator;
use crate::prefetch::{PrefetchJob, PrefetchQueue};
use crate::registry::{PlotRegistry, SortKey, SortOrder};
use crate::segmentation::{EndMark, PlotDraft, SegmentationMachine};
use crate::service::{FieldService, ServiceError};
use crate::worker::{Job, JobResult, LookupWorker};


/// Tuning for a [`Session`], usually derived from
/// [`AppConfig`](crate::config::AppConfig).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub debounce: Duration,
    pub jump_step: usize,
    pub prefetch_max_in_flight: usize,
    pub metadata_prefetch_radius: usize,
    pub cache_capacity: usize,
    /// Camera recorded on plots when the directory names none
    pub default_camera_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: COMMIT_DEBOUNCE,
            jump_step: JUMP_STEP,
            prefetch_max_in_flight: PREFETCH_MAX_IN_FLIGHT,
            metadata_prefetch_radius: METADATA_PREFETCH_RADIUS,
            cache_capacity: PLOT_CACHE_CAPACITY,
            default_camera_id: "default".to_string(),
        }
    }
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// Message for the operator, drained with [`Session::take_notices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

/// Outcome of [`Session::mark_end`].
#[derive(Debug, Clone, PartialEq)]
pub enum MarkEnd {
    /// Plot stored in the backend and the registry
    Committed(PlotSegment),
    /// A stitch direction must be chosen before the plot can be stored
    NeedsDirection,
}

/// Membership shown for an image.
#[derive(Debug, Clone, PartialEq)]
struct Displayed {
    image: String,
    membership: PlotMembership,
}

/// Plot-marking session over one directory at a time.
pub struct Session {
    service: Arc<dyn FieldService>,
    config: SessionConfig,
    worker: LookupWorker,

    directory: Option<DirectoryKey>,
    /// Bumped on every directory change
    epoch: u64,
    navigator: ImageNavigator,
    cache: PlotIndexCache,
    prefetch: PrefetchQueue,
    /// Foreground lookups of this epoch not yet returned
    foreground_pending: usize,

    segmentation: SegmentationMachine,
    gps: GpsAlignment,
    registry: PlotRegistry,
    crop: CropEditor,
    saved_mask: Option<CropMask>,

    displayed: Option<Displayed>,
    map_center: Option<LatLon>,
    notices: Vec<Notice>,
}

impl Session {
    /// Create a session with no directory loaded.
    pub fn new(
        service: Arc<dyn FieldService>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let worker = LookupWorker::spawn(Arc::clone(&service)).map_err(SessionError::Worker)?;
        Ok(Self {
            navigator: ImageNavigator::with_debounce(Vec::new(), config.debounce),
            cache: PlotIndexCache::with_capacity(config.cache_capacity),
            prefetch: PrefetchQueue::new(config.prefetch_max_in_flight),
            service,
            config,
            worker,
            directory: None,
            epoch: 0,
            foreground_pending: 0,
            segmentation: SegmentationMachine::default(),
            gps: GpsAlignment::default(),
            registry: PlotRegistry::new(),
            crop: CropEditor::new(),
            saved_mask: None,
            displayed: None,
            map_center: None,
            notices: Vec::new(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn directory(&self) -> Option<&DirectoryKey> {
        self.directory.as_ref()
    }

    pub fn navigator(&self) -> &ImageNavigator {
        &self.navigator
    }

    pub fn cache(&self) -> &PlotIndexCache {
        &self.cache
    }

    pub fn segmentation(&self) -> &SegmentationMachine {
        &self.segmentation
    }

    pub fn gps(&self) -> &GpsAlignment {
        &self.gps
    }

    pub fn registry(&self) -> &PlotRegistry {
        &self.registry
    }

    pub fn crop(&self) -> &CropEditor {
        &self.crop
    }

    /// Crop editor, for routing pointer gestures.
    pub fn crop_mut(&mut self) -> &mut CropEditor {
        &mut self.crop
    }

    /// Mask last saved for this directory.
    pub fn saved_mask(&self) -> Option<CropMask> {
        self.saved_mask
    }

    /// Where the map should be centred, if anywhere.
    pub fn map_center(&self) -> Option<LatLon> {
        self.map_center
    }

    /// Membership of the committed image, once its lookup has landed.
    pub fn current_membership(&self) -> Option<&PlotMembership> {
        let committed = self.navigator.committed_image()?;
        self.displayed
            .as_ref()
            .filter(|d| d.image == committed)
            .map(|d| &d.membership)
    }

    /// Coordinate of the committed image, when known.
    pub fn current_position(&self) -> Option<LatLon> {
        self.current_membership().and_then(PlotMembership::position)
    }

    /// Whether any lookup, prefetch or cursor commit is outstanding.
    pub fn has_pending_work(&self) -> bool {
        self.navigator.is_settling() || self.worker.pending_count() > 0 || !self.prefetch.is_empty()
    }

    /// Drain accumulated operator notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn require_directory(&self) -> Result<DirectoryKey, SessionError> {
        self.directory.clone().ok_or(SessionError::NoDirectory)
    }

    /// Log and surface a failed action, then hand the result back.
    fn report<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(e) = &result {
            log::warn!("{}", e);
            self.notices.push(Notice::warning(e.to_string()));
        }
        result
    }

    // =========================================================================
    // Directory
    // =========================================================================

    /// Load a directory and make it current.
    ///
    /// Everything is fetched before any state changes, so a failure leaves
    /// the previous directory fully intact.
    pub fn open_directory(&mut self, dir: DirectoryKey) -> Result<(), SessionError> {
        let result = self.load_directory(dir);
        self.report(result)
    }

    fn load_directory(&mut self, dir: DirectoryKey) -> Result<(), SessionError> {
        let service = self.service.as_ref();
        let images = service.list_images(&dir)?;
        let plots = service.marked_plots(&dir)?;
        let max_plot_index = service.max_plot_index(&dir)?;
        let mask = service.stitch_mask(&dir)?;
        let gps = GpsAlignment::load(service, &dir)?;

        self.epoch += 1;
        log::info!(
            "📂 Opened {} ({} images, {} plots, epoch {})",
            dir,
            images.len(),
            plots.len(),
            self.epoch
        );

        self.navigator = ImageNavigator::with_debounce(images, self.config.debounce);
        self.cache = PlotIndexCache::with_capacity(self.config.cache_capacity);
        self.prefetch.reset();
        self.foreground_pending = 0;
        self.registry.replace_all(plots);
        let latest_direction = self
            .registry
            .max_plot_index()
            .and_then(|max| self.registry.get(max))
            .map(|plot| plot.stitch_direction);
        self.segmentation =
            SegmentationMachine::new(max_plot_index.map_or(0, |max| max.saturating_add(1)))
                .with_remembered_direction(latest_direction);
        self.gps = gps;
        self.crop.cancel_crop();
        self.saved_mask = mask;
        self.displayed = None;
        self.map_center = None;
        self.directory = Some(dir);

        self.on_committed();
        Ok(())
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Advance the session: apply a due commit, collect results, prefetch.
    pub fn tick(&mut self, now: Instant) {
        if self.navigator.poll(now).is_some() {
            self.on_committed();
        }
        while let Some(result) = self.worker.take_one_result() {
            self.handle_result(result);
        }
        self.dispatch_prefetch();
    }

    /// Tick until nothing is outstanding or `timeout` elapses.
    /// Returns `true` if the session went idle.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            self.tick(now);
            if !self.has_pending_work() {
                return true;
            }
            if now >= deadline {
                return false;
            }
            if let Some(result) = self.worker.wait_one_result(Duration::from_millis(5)) {
                self.handle_result(result);
            }
        }
    }

    /// The committed image changed: look it up and refill the prefetch queue.
    fn on_committed(&mut self) {
        self.request_current();

        self.prefetch.retarget();
        let Some(dir) = self.directory.clone() else {
            return;
        };
        for index in self.navigator.prefetch_targets() {
            if let Some(image) = self.navigator.image_at(index) {
                let url = self.service.image_url(&dir, image);
                self.prefetch.enqueue_image(url);
            }
        }
        for index in self
            .navigator
            .metadata_window(self.config.metadata_prefetch_radius)
        {
            if let Some(image) = self.navigator.image_at(index) {
                self.prefetch.enqueue_metadata(image.to_string());
            }
        }
    }

    fn current_key(&self) -> Option<CacheKey> {
        let dir = self.directory.clone()?;
        let image = self.navigator.committed_image()?;
        Some(CacheKey::new(dir, image))
    }

    fn is_current(&self, key: &CacheKey) -> bool {
        self.directory.as_ref() == Some(&key.directory)
            && self.navigator.committed_image() == Some(key.image.as_str())
    }

    /// Resolve the committed image, dispatching a lookup on a miss.
    fn request_current(&mut self) {
        let Some(key) = self.current_key() else {
            return;
        };
        match self.cache.resolve(key.clone()) {
            Resolution::Ready(membership) => self.show(key.image, membership),
            Resolution::Pending => {}
            Resolution::Dispatch(ticket) => {
                self.foreground_pending += 1;
                self.worker.submit(Job::Membership {
                    epoch: self.epoch,
                    ticket,
                    background: false,
                });
            }
        }
    }

    fn show(&mut self, image: String, membership: PlotMembership) {
        if let Some(position) = membership.position() {
            self.map_center = Some(position);
        }
        self.displayed = Some(Displayed { image, membership });
    }

    fn handle_result(&mut self, result: JobResult) {
        if result.epoch() != self.epoch {
            log::debug!("Dropping result from epoch {} (now {})", result.epoch(), self.epoch);
            return;
        }

        match result {
            JobResult::Membership {
                ticket,
                background,
                result,
                ..
            } => {
                if background {
                    self.prefetch.job_finished();
                } else {
                    self.foreground_pending = self.foreground_pending.saturating_sub(1);
                }
                match result {
                    Ok(membership) => {
                        let stored = self.cache.complete(&ticket, membership.clone());
                        if stored && self.is_current(&ticket.key) {
                            self.show(ticket.key.image, membership);
                        }
                    }
                    Err(e) => {
                        self.cache.abandon(&ticket);
                        if background {
                            log::debug!("Metadata prefetch for {} failed: {}", ticket.key.image, e);
                        } else {
                            log::warn!("Lookup for {} failed: {}", ticket.key.image, e);
                            self.notices.push(Notice::warning(format!(
                                "Could not load plot info for {}: {}",
                                ticket.key.image, e
                            )));
                        }
                    }
                }
            }
            JobResult::Image { url, result, .. } => {
                self.prefetch.job_finished();
                match result {
                    Ok(bytes) => log::trace!("Prefetched {} ({} bytes)", url, bytes),
                    Err(e) => log::debug!("Prefetch of {} failed: {}", url, e),
                }
            }
        }
    }

    /// Hand queued prefetch jobs to the worker while the foreground is quiet.
    fn dispatch_prefetch(&mut self) {
        if self.foreground_pending > 0 || self.navigator.is_settling() {
            return;
        }
        let Some(current) = self.current_key() else {
            return;
        };
        if self.cache.is_in_flight(&current) {
            return;
        }

        while let Some(job) = self.prefetch.next_ready() {
            match job {
                PrefetchJob::Image { url } => {
                    log::trace!("Prefetch: image {}", url);
                    self.worker.submit(Job::Image {
                        epoch: self.epoch,
                        url,
                    });
                }
                PrefetchJob::Metadata { image } => {
                    let key = CacheKey::new(current.directory.clone(), image);
                    match self.cache.resolve(key) {
                        Resolution::Dispatch(ticket) => {
                            log::trace!("Prefetch: metadata {}", ticket.key.image);
                            self.worker.submit(Job::Membership {
                                epoch: self.epoch,
                                ticket,
                                background: true,
                            });
                        }
                        Resolution::Ready(_) | Resolution::Pending => self.prefetch.job_finished(),
                    }
                }
            }
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn set_visual_index(&mut self, index: isize, now: Instant) {
        self.navigator.set_visual_index(index, now);
    }

    pub fn prev_image(&mut self, now: Instant) {
        self.navigator.prev_image(now);
    }

    pub fn next_image(&mut self, now: Instant) {
        self.navigator.next_image(now);
    }

    pub fn jump_forward(&mut self, now: Instant) {
        self.navigator.jump(self.config.jump_step as isize, now);
    }

    pub fn jump_back(&mut self, now: Instant) {
        self.navigator.jump(-(self.config.jump_step as isize), now);
    }

    pub fn seek_to_image(&mut self, image: &str, now: Instant) -> bool {
        self.navigator.seek_to_image(image, now)
    }

    /// Move the cursor to the first image of a marked plot.
    pub fn go_to_plot(&mut self, plot_index: u32, now: Instant) -> Result<(), SessionError> {
        let result = match self.registry.get(plot_index) {
            Some(plot) => {
                let start = plot.start_image.clone();
                if self.navigator.seek_to_image(&start, now) {
                    Ok(())
                } else {
                    Err(ServiceError::NotFound(start).into())
                }
            }
            None => Err(SessionError::PlotNotFound(plot_index)),
        };
        self.report(result)
    }

    /// Apply any pending cursor move right away.
    pub fn commit_now(&mut self) {
        if self.navigator.commit_now().is_some() {
            self.on_committed();
        }
    }

    /// Image an action applies to: the one under the cursor, committed first.
    fn action_image(&mut self) -> Result<String, SessionError> {
        self.require_directory()?;
        self.commit_now();
        self.navigator
            .committed_image()
            .map(str::to_string)
            .ok_or(SessionError::NoImages)
    }

    // =========================================================================
    // Plot segmentation
    // =========================================================================

    /// Mark the image under the cursor as the start of a plot.
    pub fn mark_start(&mut self) -> Result<(), SessionError> {
        let result = self
            .action_image()
            .and_then(|image| self.segmentation.mark_start(&image));
        self.report(result)
    }

    /// Mark the image under the cursor as the end of the open plot.
    ///
    /// With `direction` given, or one remembered from an earlier plot in a
    /// non-empty registry, the plot is committed right away.
    pub fn mark_end(
        &mut self,
        direction: Option<StitchDirection>,
    ) -> Result<MarkEnd, SessionError> {
        let result = self.try_mark_end(direction);
        self.report(result)
    }

    fn try_mark_end(
        &mut self,
        direction: Option<StitchDirection>,
    ) -> Result<MarkEnd, SessionError> {
        let image = self.action_image()?;
        let registry_empty = self.registry.is_empty();
        match self.segmentation.mark_end(&image, direction, registry_empty)? {
            EndMark::Ready(draft) => self.commit_draft(draft).map(MarkEnd::Committed),
            EndMark::NeedsDirection => Ok(MarkEnd::NeedsDirection),
        }
    }

    /// Answer the direction prompt and commit the plot.
    pub fn choose_direction(
        &mut self,
        direction: StitchDirection,
    ) -> Result<PlotSegment, SessionError> {
        let result = self
            .segmentation
            .choose_direction(direction)
            .and_then(|draft| self.commit_draft(draft));
        self.report(result)
    }

    /// Close the direction prompt; the start stays marked.
    pub fn dismiss_direction(&mut self) -> Result<(), SessionError> {
        let result = self.segmentation.dismiss_direction();
        self.report(result)
    }

    /// Drop the marked start.
    pub fn cancel_segment(&mut self) -> Result<(), SessionError> {
        let result = self.segmentation.cancel();
        self.report(result)
    }

    /// Attach "shift all" to the next commit.
    pub fn set_shift_all(&mut self, shift_all: bool) {
        self.segmentation.set_shift_all(shift_all);
    }

    /// Override the index the next plot will get.
    pub fn set_suggested_index(&mut self, plot_index: u32) {
        self.segmentation.set_suggested_index(plot_index);
    }

    fn commit_draft(&mut self, draft: PlotDraft) -> Result<PlotSegment, SessionError> {
        let dir = self.require_directory()?;
        let segment = draft.to_segment(dir.camera_id_or(&self.config.default_camera_id));

        if self.registry.contains(segment.plot_index) {
            self.segmentation.commit_failed()?;
            return Err(SessionError::DuplicatePlotIndex(segment.plot_index));
        }
        if let Err(e) = self.service.mark_plot(&dir, &segment) {
            self.segmentation.commit_failed()?;
            return Err(e.into());
        }

        self.registry.add(segment.clone())?;
        self.cache.invalidate_all();
        self.segmentation.commit_succeeded()?;
        log::info!(
            "✅ Plot {} saved: {} -> {} ({})",
            segment.plot_index,
            segment.start_image,
            segment.end_image,
            segment.stitch_direction
        );
        self.notices
            .push(Notice::info(format!("Plot {} saved", segment.plot_index)));
        self.request_current();
        Ok(segment)
    }

    /// Delete a marked plot, freeing its index.
    pub fn delete_plot(&mut self, plot_index: u32) -> Result<PlotSegment, SessionError> {
        let result = self.try_delete_plot(plot_index);
        self.report(result)
    }

    fn try_delete_plot(&mut self, plot_index: u32) -> Result<PlotSegment, SessionError> {
        let dir = self.require_directory()?;
        if !self.registry.contains(plot_index) {
            return Err(SessionError::PlotNotFound(plot_index));
        }
        self.service.delete_plot(&dir, plot_index)?;
        let removed = self
            .registry
            .remove(plot_index)
            .ok_or(SessionError::PlotNotFound(plot_index))?;
        self.cache.invalidate_all();
        log::info!("🗑️ Plot {} deleted", plot_index);
        self.request_current();
        Ok(removed)
    }

    /// Marked plots in display order.
    pub fn list_plots(&self, key: SortKey, order: SortOrder) -> Vec<&PlotSegment> {
        self.registry.list(key, order)
    }

    // =========================================================================
    // GPS alignment
    // =========================================================================

    /// Record the committed image's coordinate as the GPS reference.
    pub fn mark_reference(&mut self) -> Result<LatLon, SessionError> {
        let current = self.current_position();
        let result = self
            .require_directory()
            .and_then(|dir| self.gps.mark_reference(self.service.as_ref(), &dir, current));
        self.report(result)
    }

    /// Shift the track onto the reference, then re-filter plot borders.
    pub fn apply_shift(&mut self) -> Result<GpsShift, SessionError> {
        let current = self.current_position();
        let result = self.require_directory().and_then(|dir| {
            self.gps
                .apply_shift(self.service.as_ref(), &dir, current, &mut self.cache)
        });
        let shift = self.report(result)?;
        self.notices.push(Notice::info(format!(
            "GPS shifted by ({:+.7}, {:+.7})",
            shift.lat_shift, shift.lon_shift
        )));
        self.refilter_after_change();
        Ok(shift)
    }

    /// Remove the active shift, then re-filter plot borders.
    pub fn undo_shift(&mut self) -> Result<(), SessionError> {
        let result = self.require_directory().and_then(|dir| {
            self.gps
                .undo_shift(self.service.as_ref(), &dir, &mut self.cache)
        });
        self.report(result)?;
        self.notices.push(Notice::info("GPS shift undone"));
        self.refilter_after_change();
        Ok(())
    }

    /// A shift that took effect stays applied even if the re-filter fails.
    /// The failure is reported, and the track and current membership are
    /// reloaded so nothing keeps showing pre-shift coordinates.
    fn refilter_after_change(&mut self) {
        let Err(e) = self.refilter_plots() else {
            return;
        };
        log::debug!("Re-filter failed, reloading the track only: {}", e);
        self.displayed = None;
        self.map_center = None;
        if let Some(dir) = self.directory.clone() {
            if let Err(e) = self.gps.reload_track(self.service.as_ref(), &dir) {
                log::warn!("GPS track reload for {} failed: {}", dir, e);
                self.notices
                    .push(Notice::warning(format!("Could not reload the GPS track: {}", e)));
            }
        }
        self.request_current();
    }

    /// Regenerate plot borders and reload everything derived from the track.
    pub fn refilter_plots(&mut self) -> Result<(), SessionError> {
        let result = self.try_refilter_plots();
        self.report(result)
    }

    fn try_refilter_plots(&mut self) -> Result<(), SessionError> {
        let dir = self.require_directory()?;
        self.service.refilter_plot_borders(&dir)?;
        self.cache.invalidate_all();
        self.gps.reload_track(self.service.as_ref(), &dir)?;
        self.registry.replace_all(self.service.marked_plots(&dir)?);
        self.displayed = None;
        self.request_current();
        self.map_center = self.current_position();
        log::info!("Plot borders re-filtered for {}", dir);
        Ok(())
    }

    // =========================================================================
    // Stitch mask
    // =========================================================================

    /// Open the crop editor on the displayed image.
    pub fn begin_crop(&mut self, layout: ImageLayout) -> Result<(), SessionError> {
        let result = self
            .require_directory()
            .and_then(|_| self.crop.begin_crop(layout));
        self.report(result)
    }

    /// Compute the mask for the current box; [`save_crop`](Self::save_crop)
    /// persists it.
    pub fn confirm_crop(&mut self) -> Result<CropMask, SessionError> {
        let result = self.crop.confirm_crop();
        self.report(result)
    }

    /// Leave the save confirmation and keep adjusting the box.
    pub fn back_to_edit(&mut self) -> Result<(), SessionError> {
        let result = self.crop.back_to_edit();
        self.report(result)
    }

    /// Persist the confirmed mask. On failure the editor stays in the
    /// confirmation step so the save can be retried.
    pub fn save_crop(&mut self) -> Result<CropMask, SessionError> {
        let result = self.try_save_crop();
        self.report(result)
    }

    fn try_save_crop(&mut self) -> Result<CropMask, SessionError> {
        let dir = self.require_directory()?;
        let mask = self
            .crop
            .pending_mask()
            .ok_or_else(|| SessionError::invalid_crop("save", self.crop.state().name()))?;
        self.service.save_stitch_mask(&dir, mask)?;
        self.crop.finish();
        self.saved_mask = Some(mask);
        log::info!("Stitch mask saved for {}: {:?}", dir, mask.to_array());
        self.notices.push(Notice::info("Stitch mask saved"));
        Ok(mask)
    }

    pub fn cancel_crop(&mut self) {
        self.crop.cancel_crop();
    }
}
