//! Plain-text rendering of list views for the terminal.

use causeboard_core::controller::{ListController, ViewState};
use causeboard_core::models::{EntityKind, ListItem};
use causeboard_core::utils::truncate_string;

// ============================================================================
// Column Widths
// ============================================================================

const ID_WIDTH: usize = 8;
const NAME_WIDTH: usize = 28;
const FIELD_WIDTH: usize = 16;

/// Table of the current page, followed by the pager line.
pub fn print_list(list: &ListController) {
    let kind = list.kind();
    println!("{} ({})", kind.title(), list.age_display());

    match list.state() {
        ViewState::Idle | ViewState::Loading if !list.has_data() => {
            println!("  Loading...");
            return;
        }
        ViewState::Error => {
            if let Some(error) = list.error() {
                println!("  Error: {}", error);
                println!("  Type 'r' to retry.");
            }
            if !list.has_data() {
                return;
            }
        }
        _ => {}
    }

    print_header(kind);
    if list.rows().is_empty() {
        println!("  No matching records.");
    }
    for row in list.rows() {
        let marker = if list.selection().is_selected(row.id()) { '>' } else { ' ' };
        println!("{}{}", marker, format_row(kind, row));
    }

    let pagination = list.pagination();
    println!(
        "  {}  (page {}/{})",
        pagination.range_label(),
        pagination.current_page,
        pagination.total_pages
    );
    if list.selection().is_drawer_open() {
        if let Some(item) = list.selected_item() {
            println!("  Open: {} #{} (c to close)", item.display_name(), item.id());
        }
    }
}

/// Searchable columns first, then facets not already shown.
fn columns(kind: EntityKind) -> Vec<&'static str> {
    let mut columns = kind.searchable_fields().to_vec();
    for &facet in kind.facets() {
        if !columns.contains(&facet) {
            columns.push(facet);
        }
    }
    columns
}

fn print_header(kind: EntityKind) {
    let mut line = format!(" {:<width$}", "ID", width = ID_WIDTH);
    for column in columns(kind) {
        line.push_str(&format!(" {:<width$}", column.to_uppercase(), width = column_width(column)));
    }
    println!("{}", line);
}

fn format_row(kind: EntityKind, row: &ListItem) -> String {
    let mut line = format!("{:<width$}", truncate_string(row.id().as_str(), ID_WIDTH), width = ID_WIDTH);
    for column in columns(kind) {
        let width = column_width(column);
        let value = row.field(column).map(|v| v.to_string()).unwrap_or_default();
        line.push_str(&format!(" {:<width$}", truncate_string(&value, width), width = width));
    }
    line
}

fn column_width(column: &str) -> usize {
    match column {
        "title" | "name" | "email" => NAME_WIDTH,
        _ => FIELD_WIDTH,
    }
}

/// Detail drawer contents, one line per declared field that has a value.
pub fn print_item(item: &ListItem) {
    println!("{} #{}", item.display_name(), item.id());
    for name in item.kind().field_names() {
        if let Some(value) = item.field(name) {
            println!("  {:<20} {}", name, value);
        }
    }
}

pub fn print_kinds() {
    for kind in EntityKind::ALL {
        let (sort_key, direction) = kind.default_sort();
        println!(
            "{:<16} {:<16} facets: {:<28} sort: {} {}",
            kind.path(),
            kind.title(),
            kind.facets().join(", "),
            sort_key,
            direction.as_str()
        );
    }
}
