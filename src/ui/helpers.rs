use anyhow::Error;
use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Extract the most relevant error message from a chained error.
pub(crate) fn surface_error(err: &Error) -> String {
    err.chain()
        .last()
        .map(|cause| cause.to_string())
        .unwrap_or_else(|| err.to_string())
}

/// Clamp `current + offset` into `0..len`. Returns 0 for an empty list.
pub(crate) fn offset_index(current: usize, offset: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let moved = current as isize + offset;
    moved.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;

    #[test]
    fn offset_index_clamps_both_ends() {
        assert_eq!(offset_index(0, -1, 3), 0);
        assert_eq!(offset_index(1, 5, 3), 2);
        assert_eq!(offset_index(2, -1, 3), 1);
        assert_eq!(offset_index(4, 1, 0), 0);
    }

    #[test]
    fn surface_error_reports_root_cause() {
        let err = Err::<(), _>(anyhow!("disk full"))
            .context("failed to open SQLite database")
            .unwrap_err();
        assert_eq!(surface_error(&err), "disk full");
    }
}
