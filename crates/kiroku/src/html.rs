use anyhow::Result;
use chrono::NaiveDate;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::app::{DayView, EntryModal, EntryTarget, NO_RECORDS};
use crate::calendar::{navigate, CalendarGrid, Cell, WEEKDAY_LABELS};
use crate::types::{Record, RecordForm};

/// Everything the page shows
pub struct PageView<'a> {
    pub grid: &'a CalendarGrid,
    /// Records per calendar day, used to mark grid cells
    pub counts: &'a BTreeMap<NaiveDate, usize>,
    pub selected: Option<&'a DayView>,
    pub modal: &'a EntryModal,
    /// Values to put back into the open form after a failed save
    pub form: &'a RecordForm,
    pub records: &'a [Record],
}

/// Write a static page to `path`
pub fn generate_html(view: &PageView, path: &Path) -> Result<()> {
    let html = render_page(view);
    fs::write(path, html.into_string())?;
    Ok(())
}

pub fn month_link(year: i32, month: u32) -> String {
    format!("/?year={}&month={}", year, month)
}

/// Page link for a month with a selected day; the date is percent-encoded
pub fn day_link(year: i32, month: u32, date: &str) -> String {
    format!(
        "{}&date={}",
        month_link(year, month),
        urlencoding::encode(date)
    )
}

pub fn render_page(view: &PageView) -> Markup {
    let grid = view.grid;
    let (prev_year, prev_month) = navigate(grid.year, grid.month, -1);
    let (next_year, next_month) = navigate(grid.year, grid.month, 1);

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Kiroku" }
                style { (PreEscaped(CSS)) }
            }
            body {
                div.container {
                    h1 { "Kiroku" }
                    div.month-nav {
                        a.nav-button #"prev-month" href=(month_link(prev_year, prev_month)) { "◀" }
                        span.month-title #"current-month" { (grid.title()) }
                        a.nav-button #"next-month" href=(month_link(next_year, next_month)) { "▶" }
                    }
                    (render_grid(grid, view.counts, view.selected.map(|d| d.date.as_str())))

                    @if let Some(day) = view.selected {
                        (render_day(grid, day, view.modal, view.form))
                    }

                    section.quick-entry {
                        h2 { "Log a study session" }
                        (render_form(grid, None, quick_error(view.modal), quick_values(view)))
                    }

                    section.all-records {
                        h2 { "All records" }
                        @if view.records.is_empty() {
                            div.empty-state { p { "No records yet." } }
                        } @else {
                            ul #"record-list" {
                                @for record in view.records {
                                    li { (record.list_line()) }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn quick_error<'a>(modal: &'a EntryModal) -> Option<&'a str> {
    match modal {
        EntryModal::Open {
            target: EntryTarget::Now,
            error,
        } => error.as_deref(),
        _ => None,
    }
}

fn quick_values<'a>(view: &'a PageView) -> Option<&'a RecordForm> {
    quick_error(view.modal).map(|_| view.form)
}

fn render_grid(
    grid: &CalendarGrid,
    counts: &BTreeMap<NaiveDate, usize>,
    selected: Option<&str>,
) -> Markup {
    html! {
        table.calendar {
            thead {
                tr {
                    @for label in WEEKDAY_LABELS {
                        th { (label) }
                    }
                }
            }
            tbody #"calendar-body" {
                @for row in &grid.rows {
                    tr {
                        @for cell in row {
                            @match cell {
                                Cell::Empty => td.empty {},
                                Cell::Day { day, iso_date } => {
                                    @let count = NaiveDate::parse_from_str(iso_date, "%Y-%m-%d")
                                        .ok()
                                        .and_then(|d| counts.get(&d).copied())
                                        .unwrap_or(0);
                                    td.calendar-date
                                        .has-records[count > 0]
                                        .selected[selected == Some(iso_date.as_str())]
                                        data-date=(iso_date) {
                                        a href=(day_link(grid.year, grid.month, iso_date)) { (day) }
                                        @if count > 0 {
                                            span.record-count { (count) }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn render_day(grid: &CalendarGrid, day: &DayView, modal: &EntryModal, form: &RecordForm) -> Markup {
    let (open, error) = match modal {
        EntryModal::Open {
            target: EntryTarget::Day(date),
            error,
        } if *date == day.date => (true, error.as_deref()),
        _ => (false, None),
    };

    html! {
        section.day-records {
            h2 #"selectedDate" { "Selected: " (day.date) }
            ul #"date-record-list" {
                @if day.records.is_empty() {
                    li.empty-state { (NO_RECORDS) }
                } @else {
                    @for record in &day.records {
                        li { (record.day_line()) }
                    }
                }
            }
            @if open {
                div.modal #"calendar-modal" {
                    (render_form(grid, Some(day.date.as_str()), error, error.map(|_| form)))
                    a.cancel href=(month_link(grid.year, grid.month)) { "Cancel" }
                }
            }
        }
    }
}

fn render_form(
    grid: &CalendarGrid,
    date: Option<&str>,
    error: Option<&str>,
    values: Option<&RecordForm>,
) -> Markup {
    let empty = RecordForm::default();
    let values = values.unwrap_or(&empty);

    html! {
        form.entry-form method="post" action="/records" {
            @if let Some(date) = date {
                input type="hidden" name="date" value=(date);
            }
            input type="hidden" name="year" value=(grid.year);
            input type="hidden" name="month" value=(grid.month);
            label {
                "Content"
                input type="text" name="content" value=(values.content);
            }
            label {
                "Minutes"
                input type="number" name="time" min="0" step="any" value=(values.time);
            }
            label {
                "Note"
                textarea name="note" { (values.note) }
            }
            @if let Some(error) = error {
                p.error-msg { (error) }
            }
            button type="submit" { "Save" }
        }
    }
}

const CSS: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    background: #0a0a0a;
    color: #fff;
    min-height: 100vh;
    line-height: 1.4;
}

.container {
    max-width: 900px;
    margin: 0 auto;
    padding: 40px 24px 60px;
}

h1 {
    font-weight: 900;
    font-size: 3em;
    letter-spacing: -0.03em;
    text-transform: uppercase;
    margin-bottom: 24px;
    text-shadow: 4px 4px 0 #ff0096, -2px -2px 0 #00ffff;
}

h2 {
    font-size: 1em;
    text-transform: uppercase;
    letter-spacing: 0.15em;
    margin: 40px 0 16px;
    color: #00ffff;
}

.month-nav {
    display: flex;
    align-items: center;
    gap: 16px;
    margin-bottom: 16px;
}

.month-title {
    font-weight: 700;
    font-size: 1.3em;
    min-width: 200px;
    text-align: center;
}

.nav-button, .cancel {
    color: #ff0096;
    text-decoration: none;
    font-weight: 700;
}

.calendar {
    width: 100%;
    border-collapse: collapse;
    table-layout: fixed;
}

.calendar th {
    color: #888;
    font-size: 0.8em;
    text-transform: uppercase;
    padding: 8px 0;
}

.calendar td {
    height: 64px;
    border: 1px solid rgba(255,255,255,0.1);
    vertical-align: top;
    padding: 6px;
    position: relative;
}

.calendar-date a {
    color: #fff;
    text-decoration: none;
    display: block;
    height: 100%;
}

.calendar-date:hover {
    background: rgba(255,255,255,0.05);
}

.calendar-date.selected {
    border-color: #ff0096;
}

.calendar-date.has-records {
    background: rgba(0,255,255,0.08);
}

.record-count {
    position: absolute;
    right: 6px;
    bottom: 6px;
    font-size: 0.7em;
    color: #000;
    background: #00ffff;
    padding: 1px 6px;
}

ul {
    list-style: none;
}

li {
    padding: 10px 14px;
    margin-bottom: 8px;
    background: rgba(255,255,255,0.03);
    border: 1px solid rgba(255,255,255,0.1);
}

.modal {
    margin-top: 16px;
    padding: 16px;
    border: 1px solid #ff0096;
}

.entry-form {
    display: grid;
    gap: 12px;
    margin-bottom: 8px;
}

.entry-form label {
    display: grid;
    gap: 4px;
    font-size: 0.85em;
    color: #ccc;
}

.entry-form input, .entry-form textarea {
    background: #111;
    color: #fff;
    border: 1px solid rgba(255,255,255,0.2);
    padding: 8px;
    font: inherit;
}

.entry-form button {
    justify-self: start;
    background: #ff0096;
    color: #fff;
    border: none;
    padding: 8px 20px;
    font-weight: 700;
    cursor: pointer;
}

.error-msg {
    color: #ff4d4d;
    font-size: 0.85em;
}

.empty-state {
    color: #666;
    font-size: 0.9em;
}
"#;
