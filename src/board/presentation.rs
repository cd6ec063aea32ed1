//! Derived, render-ready views of the board.

use serde::{Deserialize, Serialize};

use super::models::*;

/// Style key for a column heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingColor {
    Neutral,
    Yellow,
    Blue,
    Emerald,
}

impl HeadingColor {
    pub fn for_column(column: Column) -> Self {
        match column {
            Column::Backlog => HeadingColor::Neutral,
            Column::Todo => HeadingColor::Yellow,
            Column::Doing => HeadingColor::Blue,
            Column::Done => HeadingColor::Emerald,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    pub column: Column,
    pub title: String,
    pub heading_color: HeadingColor,
    pub count: usize,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub project_id: Option<ProjectId>,
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn new(project_id: Option<ProjectId>, tasks: &[Task]) -> Self {
        Self {
            project_id,
            columns: column_views(tasks),
        }
    }

    pub fn column(&self, column: Column) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.column == column)
    }
}

/// One view per column in display order. Each keeps the relative order
/// the tasks have in `tasks`.
pub fn column_views(tasks: &[Task]) -> Vec<ColumnView> {
    Column::ALL
        .iter()
        .map(|&column| {
            let tasks: Vec<Task> = tasks
                .iter()
                .filter(|t| t.column == column)
                .cloned()
                .collect();
            ColumnView {
                column,
                title: column.title().to_string(),
                heading_color: HeadingColor::for_column(column),
                count: tasks.len(),
                tasks,
            }
        })
        .collect()
}

/// Drop zones a dragged card can hover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropZone {
    Column(Column),
    /// Dropping here deletes the card.
    BurnBarrel,
}

/// Which drop zones are currently highlighted during a drag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DragHighlight {
    columns: [bool; Column::ALL.len()],
    burn_barrel: bool,
}

impl DragHighlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drag_over(&mut self, zone: DropZone) {
        self.set(zone, true);
    }

    pub fn drag_leave(&mut self, zone: DropZone) {
        self.set(zone, false);
    }

    pub fn drop(&mut self, zone: DropZone) {
        self.set(zone, false);
    }

    pub fn is_active(&self, zone: DropZone) -> bool {
        match zone {
            DropZone::Column(column) => self.columns[column_index(column)],
            DropZone::BurnBarrel => self.burn_barrel,
        }
    }

    fn set(&mut self, zone: DropZone, active: bool) {
        match zone {
            DropZone::Column(column) => self.columns[column_index(column)] = active,
            DropZone::BurnBarrel => self.burn_barrel = active,
        }
    }
}

fn column_index(column: Column) -> usize {
    match column {
        Column::Backlog => 0,
        Column::Todo => 1,
        Column::Doing => 2,
        Column::Done => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::state::tests::task;

    #[test]
    fn test_column_views_in_display_order() {
        let views = column_views(&[]);
        let titles: Vec<_> = views.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["Backlog", "TODO", "In progress", "Complete"]);
        assert!(views.iter().all(|v| v.count == 0 && v.tasks.is_empty()));
    }

    #[test]
    fn test_column_views_filter_and_keep_order() {
        let tasks = vec![
            task("a", Column::Todo, Some(1)),
            task("b", Column::Done, Some(2)),
            task("c", Column::Todo, Some(3)),
        ];
        let board = BoardView::new(Some("p1".to_string()), &tasks);

        let todo = board.column(Column::Todo).unwrap();
        assert_eq!(todo.count, 2);
        let ids: Vec<_> = todo.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(todo.heading_color, HeadingColor::Yellow);
        assert_eq!(board.column(Column::Done).unwrap().count, 1);
        assert_eq!(board.column(Column::Backlog).unwrap().count, 0);
    }

    #[test]
    fn test_drag_highlight_per_column() {
        let mut highlight = DragHighlight::new();
        highlight.drag_over(DropZone::Column(Column::Doing));
        assert!(highlight.is_active(DropZone::Column(Column::Doing)));
        assert!(!highlight.is_active(DropZone::Column(Column::Todo)));

        highlight.drag_leave(DropZone::Column(Column::Doing));
        assert!(!highlight.is_active(DropZone::Column(Column::Doing)));

        highlight.drag_over(DropZone::Column(Column::Done));
        highlight.drop(DropZone::Column(Column::Done));
        assert_eq!(highlight, DragHighlight::new());
    }

    #[test]
    fn test_burn_barrel_has_its_own_flag() {
        let mut highlight = DragHighlight::new();
        highlight.drag_over(DropZone::BurnBarrel);
        assert!(highlight.is_active(DropZone::BurnBarrel));
        assert!(Column::ALL
            .iter()
            .all(|&c| !highlight.is_active(DropZone::Column(c))));
        highlight.drop(DropZone::BurnBarrel);
        assert!(!highlight.is_active(DropZone::BurnBarrel));
    }
}
