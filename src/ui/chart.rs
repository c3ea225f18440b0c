use chrono::{DateTime, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

use crate::error::TweetResult;
use crate::table::Table;

const LIKES_COLOR: Color = Color::Rgb(255, 165, 0);
const RETWEETS_COLOR: Color = Color::Blue;

/// Chart points sorted by time; x is seconds since the epoch.
fn series_points(series: &[(DateTime<Utc>, u64)]) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = series
        .iter()
        .map(|(date, count)| (date.timestamp() as f64, *count as f64))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

fn x_bounds(points: &[(f64, f64)]) -> [f64; 2] {
    let min = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() {
        return [0.0, 1.0];
    }
    if max > min {
        [min, max]
    } else {
        [min - 1.0, max + 1.0]
    }
}

fn date_label(secs: f64) -> String {
    DateTime::from_timestamp(secs as i64, 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Likes and retweets over time, with a one-line summary underneath.
pub fn render_engagement(frame: &mut Frame, area: Rect, table: &Table, title: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    if table.is_empty() {
        let paragraph = Paragraph::new("No tweets to plot")
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(paragraph, chunks[0]);
        return;
    }

    let likes = series_points(&table.likes_series());
    let retweets = series_points(&table.retweets_series());
    let [x_min, x_max] = x_bounds(&likes);
    let summary = table.summary();
    let y_max = (summary.max_likes.max(summary.max_retweets) as f64 * 1.1).max(1.0);

    let datasets = vec![
        Dataset::default()
            .name("Likes")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(LIKES_COLOR))
            .data(&likes),
        Dataset::default()
            .name("Retweets")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(RETWEETS_COLOR))
            .data(&retweets),
    ];

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .title("date")
                .style(Style::default().fg(Color::Gray))
                .bounds([x_min, x_max])
                .labels(vec![date_label(x_min), date_label(x_max)]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, y_max])
                .labels(vec!["0".to_string(), format!("{y_max:.0}")]),
        );
    frame.render_widget(chart, chunks[0]);

    let footer = Line::from(vec![
        Span::styled(
            format!("{} tweets", summary.rows),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " | mean length {:.1} | max likes {} | max retweets {} | q: quit",
            summary.mean_len, summary.max_likes, summary.max_retweets
        )),
    ]);
    frame.render_widget(Paragraph::new(footer), chunks[1]);
}

/// Takes over the terminal until `q` or Esc is pressed.
pub fn show_engagement(table: &Table, title: &str) -> TweetResult<()> {
    let mut terminal = ratatui::try_init()?;
    let result = (|| -> TweetResult<()> {
        loop {
            terminal.draw(|frame| render_engagement(frame, frame.area(), table, title))?;
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    return Ok(());
                }
            }
        }
    })();
    ratatui::restore();
    result
}
