//! Crop box editor producing a directory-wide stitch mask.
//!
//! The box lives in display pixels (where the pointer is) and is converted
//! to natural-pixel edge insets on confirmation. Saving is a separate step:
//! [`confirm_crop`](CropEditor::confirm_crop) computes the mask and waits,
//! and the session persists it only when the operator confirms again.

use crate::constants::{CROP_DEFAULT_FRACTION, CROP_MIN_SIZE};
use crate::error::SessionError;
use crate::model::CropMask;

/// Where and how large the image is drawn, plus its true pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageLayout {
    /// Left edge of the drawn image in display pixels
    pub left: f64,
    /// Top edge of the drawn image in display pixels
    pub top: f64,
    pub rendered_width: f64,
    pub rendered_height: f64,
    pub natural_width: u32,
    pub natural_height: u32,
}

impl ImageLayout {
    pub fn new(
        left: f64,
        top: f64,
        rendered_width: f64,
        rendered_height: f64,
        natural_width: u32,
        natural_height: u32,
    ) -> Self {
        Self {
            left,
            top,
            rendered_width,
            rendered_height,
            natural_width,
            natural_height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.rendered_width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.rendered_height
    }

    /// Natural pixels per display pixel, horizontally.
    pub fn scale_x(&self) -> f64 {
        self.natural_width as f64 / self.rendered_width
    }

    /// Natural pixels per display pixel, vertically.
    pub fn scale_y(&self) -> f64 {
        self.natural_height as f64 / self.rendered_height
    }

    /// Convert a display-space box into edge insets, floored at zero.
    pub fn mask_for(&self, rect: &CropBox) -> CropMask {
        let (sx, sy) = (self.scale_x(), self.scale_y());
        let inset = |v: f64| v.round().max(0.0) as u32;
        CropMask {
            left: inset((rect.left - self.left) * sx),
            right: inset(self.natural_width as f64 - (rect.right - self.left) * sx),
            top: inset((rect.top - self.top) * sy),
            bottom: inset(self.natural_height as f64 - (rect.bottom - self.top) * sy),
        }
    }
}

/// Clamp that tolerates `lo > hi` from float rounding by favouring `lo`.
fn fit(value: f64, lo: f64, hi: f64) -> f64 {
    value.min(hi).max(lo)
}

/// Axis-aligned box in display pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl CropBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Square box centred on the drawn image.
    fn default_for(layout: &ImageLayout) -> Self {
        let smaller = layout.rendered_width.min(layout.rendered_height);
        let side = (smaller * CROP_DEFAULT_FRACTION).max(CROP_MIN_SIZE).min(smaller);
        Self::new(
            layout.left + (layout.rendered_width - side) / 2.0,
            layout.top + (layout.rendered_height - side) / 2.0,
            side,
            side,
        )
    }
}

/// Resize grip on the crop box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl Handle {
    fn moves_left(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::Left | Handle::BottomLeft)
    }

    fn moves_right(self) -> bool {
        matches!(self, Handle::TopRight | Handle::Right | Handle::BottomRight)
    }

    fn moves_top(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::Top | Handle::TopRight)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, Handle::BottomLeft | Handle::Bottom | Handle::BottomRight)
    }
}

/// Pointer interaction in progress while editing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Gesture {
    #[default]
    Idle,
    Moving,
    Resizing(Handle),
}

/// Editor state.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CropState {
    #[default]
    Inactive,
    Editing {
        layout: ImageLayout,
        rect: CropBox,
        gesture: Gesture,
    },
    /// Mask computed, waiting for the operator to confirm the save.
    Confirming {
        layout: ImageLayout,
        rect: CropBox,
        mask: CropMask,
    },
}

impl CropState {
    pub fn name(&self) -> &'static str {
        match self {
            CropState::Inactive => "inactive",
            CropState::Editing { .. } => "editing",
            CropState::Confirming { .. } => "confirming",
        }
    }
}

/// Interactive crop box tool.
#[derive(Debug, Clone, Default)]
pub struct CropEditor {
    state: CropState,
}

impl CropEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CropState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, CropState::Inactive)
    }

    /// Current box, while editing or confirming.
    pub fn crop_box(&self) -> Option<CropBox> {
        match &self.state {
            CropState::Inactive => None,
            CropState::Editing { rect, .. } | CropState::Confirming { rect, .. } => Some(*rect),
        }
    }

    /// Mask waiting for confirmation.
    pub fn pending_mask(&self) -> Option<CropMask> {
        match &self.state {
            CropState::Confirming { mask, .. } => Some(*mask),
            _ => None,
        }
    }

    /// Start editing with the default centred box.
    pub fn begin_crop(&mut self, layout: ImageLayout) -> Result<(), SessionError> {
        Self::check_layout(&layout)?;
        let rect = CropBox::default_for(&layout);
        self.state = CropState::Editing {
            layout,
            rect,
            gesture: Gesture::Idle,
        };
        Ok(())
    }

    fn check_layout(layout: &ImageLayout) -> Result<(), SessionError> {
        if layout.rendered_width < CROP_MIN_SIZE
            || layout.rendered_height < CROP_MIN_SIZE
            || layout.natural_width == 0
            || layout.natural_height == 0
        {
            return Err(SessionError::ImageTooSmall {
                width: layout.rendered_width,
                height: layout.rendered_height,
            });
        }
        Ok(())
    }

    fn editing(
        &mut self,
        action: &'static str,
    ) -> Result<(&ImageLayout, &mut CropBox, &mut Gesture), SessionError> {
        match &mut self.state {
            CropState::Editing {
                layout,
                rect,
                gesture,
            } => Ok((&*layout, rect, gesture)),
            other => Err(SessionError::invalid_crop(action, other.name())),
        }
    }

    /// Translate the box, keeping it inside the image.
    pub fn drag_move(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        let (layout, rect, _) = self.editing("move the crop box")?;
        let (width, height) = (rect.width(), rect.height());
        let left = fit(rect.left + dx, layout.left, layout.right() - width);
        let top = fit(rect.top + dy, layout.top, layout.bottom() - height);
        *rect = CropBox::new(left, top, width, height);
        Ok(())
    }

    /// Move the edges attached to `handle`, keeping the box inside the image
    /// and at least the minimum size.
    pub fn resize_move(&mut self, handle: Handle, dx: f64, dy: f64) -> Result<(), SessionError> {
        let (layout, rect, _) = self.editing("resize the crop box")?;
        if handle.moves_left() {
            rect.left = fit(rect.left + dx, layout.left, rect.right - CROP_MIN_SIZE);
        }
        if handle.moves_right() {
            rect.right = fit(rect.right + dx, rect.left + CROP_MIN_SIZE, layout.right());
        }
        if handle.moves_top() {
            rect.top = fit(rect.top + dy, layout.top, rect.bottom - CROP_MIN_SIZE);
        }
        if handle.moves_bottom() {
            rect.bottom = fit(rect.bottom + dy, rect.top + CROP_MIN_SIZE, layout.bottom());
        }
        Ok(())
    }

    /// Pointer pressed on the box body or a handle.
    pub fn press(&mut self, pressed: Gesture) -> Result<(), SessionError> {
        let (_, _, gesture) = self.editing("start a crop gesture")?;
        *gesture = pressed;
        Ok(())
    }

    /// Pointer moved by `(dx, dy)`; routed to the active gesture.
    pub fn pointer_moved(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        let gesture = *self.editing("track the pointer")?.2;
        match gesture {
            Gesture::Idle => Ok(()),
            Gesture::Moving => self.drag_move(dx, dy),
            Gesture::Resizing(handle) => self.resize_move(handle, dx, dy),
        }
    }

    pub fn release(&mut self) {
        if let CropState::Editing { gesture, .. } = &mut self.state {
            *gesture = Gesture::Idle;
        }
    }

    /// Compute the mask for the current box and wait for save confirmation.
    pub fn confirm_crop(&mut self) -> Result<CropMask, SessionError> {
        let CropState::Editing { layout, rect, .. } = &self.state else {
            return Err(SessionError::invalid_crop("confirm", self.state.name()));
        };
        let (layout, rect) = (*layout, *rect);
        let mask = layout.mask_for(&rect);
        log::debug!(
            "Crop: box {:?} on {}x{} -> mask {:?}",
            rect,
            layout.natural_width,
            layout.natural_height,
            mask
        );
        self.state = CropState::Confirming { layout, rect, mask };
        Ok(mask)
    }

    /// Leave the confirmation step and keep editing the same box.
    pub fn back_to_edit(&mut self) -> Result<(), SessionError> {
        let CropState::Confirming { layout, rect, .. } = &self.state else {
            return Err(SessionError::invalid_crop("resume editing", self.state.name()));
        };
        self.state = CropState::Editing {
            layout: *layout,
            rect: *rect,
            gesture: Gesture::Idle,
        };
        Ok(())
    }

    /// Close the editor after the mask was saved.
    pub(crate) fn finish(&mut self) {
        self.state = CropState::Inactive;
    }

    /// Discard the box without saving.
    pub fn cancel_crop(&mut self) {
        if self.is_active() {
            log::debug!("Crop: cancelled");
        }
        self.state = CropState::Inactive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn layout() -> ImageLayout {
        ImageLayout::new(0.0, 0.0, 800.0, 600.0, 4000, 3000)
    }

    #[test]
    fn test_default_box_is_centred_square() {
        let mut editor = CropEditor::new();
        editor.begin_crop(layout()).unwrap();
        let rect = editor.crop_box().unwrap();
        assert!((rect.width() - 180.0).abs() < EPSILON);
        assert!((rect.height() - 180.0).abs() < EPSILON);
        assert!((rect.left - 310.0).abs() < EPSILON);
        assert!((rect.top - 210.0).abs() < EPSILON);
    }

    #[test]
    fn test_mask_converts_to_natural_insets() {
        let mut editor = CropEditor::new();
        editor.begin_crop(layout()).unwrap();
        // Default box (310, 210) 180x180 reshaped to (100, 100) 200x150
        editor.resize_move(Handle::TopLeft, -210.0, -110.0).unwrap();
        editor.resize_move(Handle::BottomRight, -190.0, -140.0).unwrap();
        assert_eq!(
            editor.crop_box(),
            Some(CropBox::new(100.0, 100.0, 200.0, 150.0))
        );
        let mask = editor.confirm_crop().unwrap();
        assert_eq!(mask, CropMask::new(500, 2500, 500, 1750));
        assert_eq!(editor.pending_mask(), Some(mask));
    }

    #[test]
    fn test_mask_accounts_for_letterboxing() {
        let letterboxed = ImageLayout::new(50.0, 20.0, 800.0, 600.0, 4000, 3000);
        let rect = CropBox::new(150.0, 120.0, 200.0, 150.0);
        assert_eq!(letterboxed.mask_for(&rect), CropMask::new(500, 2500, 500, 1750));
    }

    #[test]
    fn test_mask_floors_at_zero() {
        let l = layout();
        let full = CropBox::new(0.0, 0.0, 800.0, 600.0);
        assert_eq!(l.mask_for(&full), CropMask::default());
        let overhanging = CropBox::new(-5.0, -5.0, 900.0, 700.0);
        assert_eq!(l.mask_for(&overhanging), CropMask::default());
    }

    #[test]
    fn test_drag_is_clamped_to_image() {
        let mut editor = CropEditor::new();
        editor.begin_crop(layout()).unwrap();
        editor.drag_move(10_000.0, -10_000.0).unwrap();
        let rect = editor.crop_box().unwrap();
        assert!((rect.right - 800.0).abs() < EPSILON);
        assert!((rect.top - 0.0).abs() < EPSILON);
        assert!((rect.width() - 180.0).abs() < EPSILON);
    }

    #[test]
    fn test_resize_keeps_minimum_size() {
        let mut editor = CropEditor::new();
        editor.begin_crop(layout()).unwrap();
        editor.resize_move(Handle::Right, -1000.0, 0.0).unwrap();
        editor.resize_move(Handle::Bottom, 0.0, -1000.0).unwrap();
        let rect = editor.crop_box().unwrap();
        assert!((rect.width() - CROP_MIN_SIZE).abs() < EPSILON);
        assert!((rect.height() - CROP_MIN_SIZE).abs() < EPSILON);
    }

    #[test]
    fn test_resize_corner_clamps_to_bounds() {
        let mut editor = CropEditor::new();
        editor.begin_crop(layout()).unwrap();
        editor.resize_move(Handle::TopLeft, -1000.0, -1000.0).unwrap();
        let rect = editor.crop_box().unwrap();
        assert_eq!((rect.left, rect.top), (0.0, 0.0));
        assert!((rect.right - 490.0).abs() < EPSILON);
        assert!((rect.bottom - 390.0).abs() < EPSILON);
    }

    #[test]
    fn test_gestures_route_pointer_moves() {
        let mut editor = CropEditor::new();
        editor.begin_crop(layout()).unwrap();
        let before = editor.crop_box().unwrap();

        // No gesture: pointer moves are ignored
        editor.pointer_moved(5.0, 5.0).unwrap();
        assert_eq!(editor.crop_box(), Some(before));

        editor.press(Gesture::Moving).unwrap();
        editor.pointer_moved(10.0, 0.0).unwrap();
        editor.release();
        assert!((editor.crop_box().unwrap().left - (before.left + 10.0)).abs() < EPSILON);

        editor.press(Gesture::Resizing(Handle::Left)).unwrap();
        editor.pointer_moved(-20.0, 0.0).unwrap();
        assert!((editor.crop_box().unwrap().width() - 200.0).abs() < EPSILON);
    }

    #[test]
    fn test_actions_require_editing() {
        let mut editor = CropEditor::new();
        assert!(editor.drag_move(1.0, 1.0).is_err());
        assert!(editor.confirm_crop().is_err());

        editor.begin_crop(layout()).unwrap();
        editor.confirm_crop().unwrap();
        assert!(editor.drag_move(1.0, 1.0).is_err());
        editor.back_to_edit().unwrap();
        editor.drag_move(1.0, 1.0).unwrap();
    }

    #[test]
    fn test_cancel_discards_box() {
        let mut editor = CropEditor::new();
        editor.begin_crop(layout()).unwrap();
        editor.confirm_crop().unwrap();
        editor.cancel_crop();
        assert!(!editor.is_active());
        assert_eq!(editor.pending_mask(), None);
    }

    #[test]
    fn test_tiny_image_is_rejected() {
        let mut editor = CropEditor::new();
        let tiny = ImageLayout::new(0.0, 0.0, 10.0, 600.0, 100, 6000);
        assert!(matches!(
            editor.begin_crop(tiny),
            Err(SessionError::ImageTooSmall { .. })
        ));
        assert!(!editor.is_active());
    }
}
