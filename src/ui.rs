use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::time::Duration;

use crate::config::SUGGEST_POLL_INTERVAL;
use crate::monitor::StationSnapshot;
use crate::status::StationStatus;
use crate::types::{CongestionLevel, FeeRange, GasFeeEstimation, Trend};

pub struct Dashboard {
    pub should_quit: bool,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

fn gwei(wei: u128) -> f64 {
    (wei as f64) / 1_000_000_000.0
}

fn fmt_range(range: Option<FeeRange>) -> String {
    match range {
        Some(r) => format!("{:.2} - {:.2} Gwei", gwei(r.min), gwei(r.max)),
        None => "N/A".to_string(),
    }
}

fn trend_span(trend: Trend) -> Span<'static> {
    match trend {
        Trend::Up => Span::styled("up", Style::default().fg(Color::Red)),
        Trend::Down => Span::styled("down", Style::default().fg(Color::Green)),
        Trend::Level => Span::styled("level", Style::default().fg(Color::Gray)),
    }
}

impl Dashboard {
    pub fn new() -> Self {
        Self { should_quit: false }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn render(&self, frame: &mut Frame, snapshot: &StationSnapshot) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // status
                Constraint::Length(6), // suggestion tiers
                Constraint::Length(6), // statistics
                Constraint::Min(8),    // window
                Constraint::Length(5), // help
            ])
            .split(frame.area());

        self.render_status(frame, chunks[0], snapshot);
        self.render_suggestion(frame, chunks[1], snapshot);
        self.render_stats(frame, chunks[2], snapshot);
        self.render_window(frame, chunks[3], snapshot);
        self.render_help(frame, chunks[4]);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect, snapshot: &StationSnapshot) {
        let status_style = match &snapshot.status {
            StationStatus::Ok => Style::default().fg(Color::Green),
            StationStatus::ClientUnavailable => Style::default().fg(Color::Yellow),
            StationStatus::SyncFailed(_) => Style::default().fg(Color::Red),
        };

        let elapsed = snapshot.last_updated.elapsed();
        let last_update = if elapsed < Duration::from_secs(1) {
            "< 1s ago".to_string()
        } else {
            format!("{}s ago", elapsed.as_secs())
        };

        let mut line_parts = vec![
            Span::styled("Status: ", Style::default()),
            Span::styled(snapshot.status.to_string(), status_style),
            Span::styled(" | ", Style::default()),
            Span::styled("RPC: ", Style::default()),
            Span::styled(&snapshot.node_url, Style::default().fg(Color::Cyan)),
            Span::styled(" | ", Style::default()),
            Span::styled("Updated: ", Style::default()),
            Span::styled(last_update, Style::default().fg(Color::Yellow)),
        ];

        if let Some(err) = &snapshot.error {
            line_parts.push(Span::raw(" | Error: "));
            line_parts.push(Span::styled(err, Style::default().fg(Color::Red)));
        }

        let paragraph = Paragraph::new(vec![Line::from(line_parts)])
            .block(Block::default().title("Gas Station").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_suggestion(&self, frame: &mut Frame, area: Rect, snapshot: &StationSnapshot) {
        fn tier_line<'a>(label: &'a str, tier: &GasFeeEstimation, color: Color) -> Line<'a> {
            Line::from(vec![
                Span::styled(label, Style::default()),
                Span::styled(
                    format!(
                        "max {:.2} / prio {:.2} Gwei",
                        gwei(tier.suggested_max_fee_per_gas),
                        gwei(tier.suggested_max_priority_fee_per_gas)
                    ),
                    Style::default().fg(color),
                ),
            ])
        }

        let lines = match &snapshot.suggestion {
            Some(fees) => vec![
                Line::from(vec![
                    Span::styled("Base fee: ", Style::default()),
                    Span::styled(
                        format!("{:.2} Gwei", gwei(fees.estimated_base_fee)),
                        Style::default().fg(Color::Cyan),
                    ),
                ]),
                tier_line("Low:    ", &fees.low, Color::Green),
                tier_line("Medium: ", &fees.medium, Color::Yellow),
                tier_line("High:   ", &fees.high, Color::Red),
            ],
            None => vec![Line::from(Span::styled(
                "(no suggestion yet)",
                Style::default().fg(Color::DarkGray),
            ))],
        };

        let paragraph = Paragraph::new(lines)
            .block(Block::default().title("Suggested Fees").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_stats(&self, frame: &mut Frame, area: Rect, snapshot: &StationSnapshot) {
        let Some(fees) = &snapshot.suggestion else {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                "N/A",
                Style::default().fg(Color::DarkGray),
            )))
            .block(Block::default().title("Statistics").borders(Borders::ALL));
            frame.render_widget(paragraph, area);
            return;
        };

        let congestion_style = match fees.congestion_level() {
            CongestionLevel::Low => Style::default().fg(Color::Green),
            CongestionLevel::Medium => Style::default().fg(Color::Yellow),
            CongestionLevel::High => Style::default().fg(Color::Red),
        };

        let lines = vec![
            Line::from(vec![
                Span::styled("Congestion: ", Style::default()),
                Span::styled(
                    format!(
                        "{:.0}% ({:?})",
                        fees.network_congestion * 100.0,
                        fees.congestion_level()
                    ),
                    congestion_style,
                ),
                Span::raw("  |  Prio trend: "),
                trend_span(fees.priority_fee_trend),
                Span::raw("  |  Base trend: "),
                trend_span(fees.base_fee_trend),
            ]),
            Line::from(vec![
                Span::styled("Latest prio: ", Style::default()),
                Span::styled(
                    fmt_range(fees.latest_priority_fee_range),
                    Style::default().fg(Color::Magenta),
                ),
            ]),
            Line::from(vec![
                Span::styled("Window prio: ", Style::default()),
                Span::styled(
                    fmt_range(fees.historical_priority_fee_range),
                    Style::default().fg(Color::Magenta),
                ),
            ]),
            Line::from(vec![
                Span::styled("Window base: ", Style::default()),
                Span::styled(
                    fmt_range(fees.historical_base_fee_range),
                    Style::default().fg(Color::Blue),
                ),
            ]),
        ];

        let paragraph = Paragraph::new(lines)
            .block(Block::default().title("Statistics").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_window(&self, frame: &mut Frame, area: Rect, snapshot: &StationSnapshot) {
        let mut lines: Vec<Line> = Vec::new();
        for (idx, record) in snapshot.recent_blocks.iter().enumerate() {
            let age_style = if idx == 0 {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            };
            let hash = record.hash().to_string();
            let hash_short = &hash[..hash.len().min(10)];
            let median = record
                .percentile(50.0)
                .map(|tip| format!(" tip~{:.2}g", gwei(tip)))
                .unwrap_or_default();

            lines.push(Line::from(vec![
                Span::styled(format!("#{}", record.number()), age_style),
                Span::styled(format!(" {}", hash_short), Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!(" tx:{}", record.txn_tips().len()),
                    Style::default().fg(Color::Yellow),
                ),
                Span::styled(
                    format!(" gas:{:.0}%", record.gas_used_ratio() * 100.0),
                    Style::default().fg(Color::Magenta),
                ),
                Span::styled(
                    format!(" bf:{:.2}g", gwei(record.base_fee())),
                    Style::default().fg(Color::Blue),
                ),
                Span::raw(median),
            ]));
        }

        if lines.is_empty() {
            lines.push(Line::from(Span::styled(
                "(no blocks yet)",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let title = format!(
            "Fee Window {}/{} (newest first) ",
            snapshot.window_len, snapshot.window_capacity
        );
        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let help_text = vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("Press ", Style::default()),
                Span::styled("'q'", Style::default().fg(Color::Yellow)),
                Span::styled(" to quit", Style::default()),
            ]),
            Line::from(vec![
                Span::styled("Updates every ", Style::default()),
                Span::styled(
                    format!("{} seconds", SUGGEST_POLL_INTERVAL.as_secs()),
                    Style::default().fg(Color::Cyan),
                ),
            ]),
        ];

        let paragraph =
            Paragraph::new(help_text).block(Block::default().title("Help").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }
}
