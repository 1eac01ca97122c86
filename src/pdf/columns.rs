//! Two-column flow state for one render.
//!
//! All positions are measured from the top edge of the page. The engine
//! never draws; it only decides where the next block goes and what the
//! caller has to do first (switch column, open a page).

use crate::model::Column;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnGeometry {
    pub content_top: f32,
    pub page_bottom: f32,
    pub left_x: f32,
    pub right_x: f32,
    pub column_width: f32,
}

impl ColumnGeometry {
    pub fn from_page(page: &crate::config::PageSetup) -> Self {
        Self {
            content_top: page.content_top(),
            page_bottom: page.content_bottom(),
            left_x: page.left_column_x(),
            right_x: page.right_column_x(),
            column_width: page.column_width(),
        }
    }

    pub fn column_height(&self) -> f32 {
        self.page_bottom - self.content_top
    }

    fn x(&self, column: Column) -> f32 {
        match column {
            Column::Left => self.left_x,
            Column::Right => self.right_x,
        }
    }
}

/// Snapshot of the cursor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutCursor {
    pub column: Column,
    pub y_left: f32,
    pub y_right: f32,
    pub page_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Moved from the left to the right column of the same page.
    Column,
    /// Opened a new page; the block goes in its left column.
    Page,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub column: Column,
    pub x: f32,
    pub y: f32,
    pub page_index: usize,
    /// Most significant move made to find room.
    pub transition: Transition,
    /// The block is taller than the column it was put in.
    pub oversized: bool,
}

#[derive(Debug)]
pub struct ColumnLayoutEngine {
    geom: ColumnGeometry,
    column: Column,
    y: [f32; 2],
    /// Where each column starts on the current page.
    top: [f32; 2],
    page_index: usize,
    /// Full-width band kept free at the top of every new page.
    page_reserve: f32,
    pending: Option<f32>,
}

fn slot(column: Column) -> usize {
    match column {
        Column::Left => 0,
        Column::Right => 1,
    }
}

impl ColumnLayoutEngine {
    pub fn new(geom: ColumnGeometry) -> Self {
        Self {
            geom,
            column: Column::Left,
            y: [geom.content_top; 2],
            top: [geom.content_top; 2],
            page_index: 0,
            page_reserve: 0.0,
            pending: None,
        }
    }

    pub fn geometry(&self) -> &ColumnGeometry {
        &self.geom
    }

    pub fn cursor(&self) -> LayoutCursor {
        LayoutCursor {
            column: self.column,
            y_left: self.y[0],
            y_right: self.y[1],
            page_index: self.page_index,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_index + 1
    }

    /// Top of the columns on the current page, below any reserved band.
    pub fn column_top(&self) -> f32 {
        self.top[0]
    }

    fn y_mut(&mut self) -> &mut f32 {
        &mut self.y[slot(self.column)]
    }

    fn at_column_top(&self) -> bool {
        let i = slot(self.column);
        self.y[i] <= self.top[i]
    }

    fn fits(&self, height: f32) -> bool {
        self.y[slot(self.column)] + height <= self.geom.page_bottom
    }

    /// Takes a full-width band off the top of the current page, e.g. for the
    /// paper header. Only meaningful before anything was placed on the page.
    pub fn reserve_full_width(&mut self, height: f32) {
        let untouched = self.y == self.top && self.column == Column::Left;
        if !untouched {
            log::warn!("reserve_full_width after content was placed; ignored");
            return;
        }
        let top = (self.top[0] + height).min(self.geom.page_bottom);
        self.top = [top; 2];
        self.y = [top; 2];
    }

    /// Band every page opened from now on starts with (0 to clear).
    pub fn set_page_reserve(&mut self, height: f32) {
        self.page_reserve = height.clamp(0.0, self.geom.column_height() / 2.0);
    }

    /// Adds vertical space to the current column. Space never moves the
    /// cursor to another column and is dropped at the top of one.
    pub fn skip(&mut self, gap: f32) {
        if self.at_column_top() {
            return;
        }
        let bottom = self.geom.page_bottom;
        let y = self.y_mut();
        *y = (*y + gap).min(bottom);
    }

    fn next_column(&mut self) -> Transition {
        match self.column {
            Column::Left => {
                self.column = Column::Right;
                log::debug!("column break on page {}", self.page_index + 1);
                Transition::Column
            }
            Column::Right => {
                self.page_index += 1;
                self.column = Column::Left;
                let top = self.geom.content_top + self.page_reserve;
                self.top = [top; 2];
                self.y = [top; 2];
                log::debug!("page break to page {}", self.page_index + 1);
                Transition::Page
            }
        }
    }

    /// Finds room for a block of `height`. At most two moves are made; a
    /// block that does not fit a fresh column is placed at its top anyway.
    pub fn advance(&mut self, height: f32) -> Placement {
        let mut transition = Transition::None;
        let mut oversized = false;

        if !self.fits(height) {
            if self.at_column_top() {
                oversized = true;
            } else {
                transition = self.next_column();
                if !self.fits(height) {
                    if self.at_column_top() {
                        oversized = true;
                    } else if self.next_column() == Transition::Page {
                        transition = Transition::Page;
                        oversized = !self.fits(height);
                    }
                }
            }
        }
        if oversized {
            log::warn!(
                "block of {height:.1}pt exceeds the {:.1}pt column; placed unsplit",
                self.geom.page_bottom - self.y[slot(self.column)]
            );
        }

        self.pending = Some(height);
        Placement {
            column: self.column,
            x: self.geom.x(self.column),
            y: self.y[slot(self.column)],
            page_index: self.page_index,
            transition,
            oversized,
        }
    }

    /// Moves the cursor past the block placed by the last `advance`.
    pub fn commit(&mut self, height: f32) {
        if let Some(expected) = self.pending.take()
            && (expected - height).abs() > 0.01
        {
            log::debug!("commit height {height:.2} differs from advanced {expected:.2}");
        }
        let bottom = self.geom.page_bottom;
        let y = self.y_mut();
        *y = (*y + height).min(bottom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> ColumnGeometry {
        ColumnGeometry {
            content_top: 10.0,
            page_bottom: 110.0,
            left_x: 0.0,
            right_x: 60.0,
            column_width: 50.0,
        }
    }

    #[test]
    fn fills_left_then_right_then_new_page() {
        let mut e = ColumnLayoutEngine::new(geom());
        let p = e.advance(60.0);
        assert_eq!((p.column, p.y, p.transition), (Column::Left, 10.0, Transition::None));
        e.commit(60.0);

        let p = e.advance(60.0);
        assert_eq!((p.column, p.y, p.transition), (Column::Right, 10.0, Transition::Column));
        e.commit(60.0);

        let p = e.advance(60.0);
        assert_eq!(p.transition, Transition::Page);
        assert_eq!((p.column, p.page_index, p.y), (Column::Left, 1, 10.0));
    }

    #[test]
    fn oversized_block_is_placed_at_column_top() {
        let mut e = ColumnLayoutEngine::new(geom());
        let p = e.advance(250.0);
        assert!(p.oversized);
        assert_eq!(p.transition, Transition::None);
        e.commit(250.0);
        assert_eq!(e.cursor().y_left, 110.0);

        let p = e.advance(5.0);
        assert_eq!(p.column, Column::Right);
        assert!(!p.oversized);
    }

    #[test]
    fn page_reserve_applies_to_new_pages_only() {
        let mut e = ColumnLayoutEngine::new(geom());
        e.set_page_reserve(15.0);
        e.advance(90.0);
        e.commit(90.0);
        e.advance(90.0);
        e.commit(90.0);
        let p = e.advance(20.0);
        assert_eq!(p.transition, Transition::Page);
        assert_eq!(p.y, 25.0);
    }

    #[test]
    fn skip_is_dropped_at_column_top() {
        let mut e = ColumnLayoutEngine::new(geom());
        e.skip(8.0);
        assert_eq!(e.cursor().y_left, 10.0);
        e.advance(10.0);
        e.commit(10.0);
        e.skip(500.0);
        assert_eq!(e.cursor().y_left, 110.0);
        assert_eq!(e.cursor().column, Column::Left);
    }
}
