use std::time::Instant;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, Gauge, GraphType, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::{
    app::{App, ViewMode},
    history::{HistorySample, MIN_CHART_POINTS},
    pnl::{PnlSign, ProfitLoss},
    quote::{bare_symbol, Quote},
    watchlist::WatchItem,
};

const NAME_WIDTH: usize = 30;
const SELECTION_MARKER: &str = "→";
const HEADER_ROWS: u16 = 3;
const STATS_ROWS: u16 = 8;

pub fn draw(f: &mut Frame, app: &App, now: Instant) {
    match app.mode() {
        ViewMode::Chart(symbol) => render_chart_view(f, app, symbol),
        ViewMode::Table | ViewMode::Exiting => render_table_view(f, app, now),
    }
}

fn render_table_view(f: &mut Frame, app: &App, now: Instant) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Quotes
            Constraint::Length(3), // Countdown
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    render_quote_table(f, app, chunks[0]);
    render_countdown(f, app, now, chunks[1]);
    render_footer(f, chunks[2], " ↑/k/w Up | ↓/j/s Down | Enter=Chart | r=Refresh | Esc/q=Quit ");
}

fn render_quote_table(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec!["", "Symbol", "Price", "Currency", "Company Name", "P/L %", "P/L Amount"])
        .style(Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD))
        .height(1);

    let selected = app.navigation().selected();
    let suffix = &app.settings().exchange_suffix;
    let rows: Vec<Row> = app
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| quote_row(item, app.quote(&item.display_symbol), suffix, selected == Some(i)))
        .collect();

    let updated = app
        .last_update()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "waiting for first quotes".to_string());
    let mut title = vec![Span::raw(format!(" GPW Stock Prices - {} ", updated))];
    if app.is_fetching() {
        title.push(Span::styled("Refreshing... ", Style::default().fg(Color::Yellow).bold()));
    }

    let widths = [
        Constraint::Length(2),  // Marker
        Constraint::Length(12), // Symbol
        Constraint::Length(10), // Price
        Constraint::Length(8),  // Currency
        Constraint::Length(NAME_WIDTH as u16),
        Constraint::Length(10), // P/L %
        Constraint::Length(15), // P/L amount
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Line::from(title))
                .border_style(Style::default().fg(Color::Blue)),
        )
        .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let mut state = TableState::default().with_selected(selected);
    f.render_stateful_widget(table, area, &mut state);
}

fn quote_row(item: &WatchItem, quote: Option<&Quote>, suffix: &str, is_selected: bool) -> Row<'static> {
    let marker = if is_selected { SELECTION_MARKER } else { "" };
    let symbol = bare_symbol(&item.display_symbol, suffix).to_string();

    let Some(quote) = quote else {
        return Row::new(vec![
            Cell::from(marker),
            Cell::from(symbol),
            Cell::from(Line::from("...").alignment(Alignment::Right)).style(Style::default().fg(Color::DarkGray)),
            Cell::from("-"),
            Cell::from("Loading...").style(Style::default().fg(Color::DarkGray)),
            Cell::from(""),
            Cell::from(""),
        ]);
    };

    let Some(price) = quote.price.filter(|_| quote.is_ok()) else {
        let reason = quote.fetch_error.clone().unwrap_or_else(|| "no price".to_string());
        return Row::new(vec![
            Cell::from(marker),
            Cell::from(symbol),
            Cell::from(Line::from("ERROR").alignment(Alignment::Right)).style(Style::default().fg(Color::Red)),
            Cell::from("-"),
            Cell::from(truncate(&reason, NAME_WIDTH)).style(Style::default().fg(Color::Red)),
            Cell::from(""),
            Cell::from(""),
        ]);
    };

    let pnl = ProfitLoss::compute(item.purchase_price, Some(price));
    let (pnl_percent, pnl_amount) = format_pnl(&pnl, &quote.currency);
    let pnl_style = Style::default().fg(pnl_color(&pnl));

    Row::new(vec![
        Cell::from(marker),
        Cell::from(symbol).style(Style::default().fg(Color::Cyan)),
        Cell::from(Line::from(format!("{:.2}", price)).alignment(Alignment::Right)).style(Style::default().fg(Color::Yellow)),
        Cell::from(quote.currency.clone()),
        Cell::from(truncate(&quote.company_name, NAME_WIDTH)),
        Cell::from(Line::from(pnl_percent).alignment(Alignment::Right)).style(pnl_style),
        Cell::from(Line::from(pnl_amount).alignment(Alignment::Right)).style(pnl_style),
    ])
}

/// Percentage and amount columns. Not-applicable positions render blank.
pub fn format_pnl(pnl: &ProfitLoss, currency: &str) -> (String, String) {
    match pnl {
        ProfitLoss::NotApplicable => (String::new(), String::new()),
        ProfitLoss::Position { amount, percentage, .. } => (
            format!("{:+.2}%", percentage),
            format!("{:+.2} {}", amount, currency),
        ),
    }
}

fn pnl_color(pnl: &ProfitLoss) -> Color {
    match pnl {
        ProfitLoss::Position { sign: PnlSign::Profit, .. } => Color::Green,
        ProfitLoss::Position { sign: PnlSign::Loss, .. } => Color::Red,
        _ => Color::Gray,
    }
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn render_countdown(f: &mut Frame, app: &App, now: Instant, area: Rect) {
    let label = if app.is_fetching() {
        "Refreshing...".to_string()
    } else {
        format!("Next refresh in {}s", app.seconds_until_refresh(now))
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Refresh "))
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
        .ratio(app.refresh_progress(now))
        .label(label);
    f.render_widget(gauge, area);
}

fn render_footer(f: &mut Frame, area: Rect, keys: &'static str) {
    let footer = Paragraph::new(Line::from(Span::styled(keys, Style::default().fg(Color::Yellow))));
    f.render_widget(footer, area);
}

fn render_chart_view(f: &mut Frame, app: &App, symbol: &str) {
    let settings = app.settings();
    let bare = bare_symbol(symbol, &settings.exchange_suffix);
    let currency = app
        .quote(symbol)
        .map(|q| q.currency.as_str())
        .unwrap_or("PLN");
    let name = app
        .quote(symbol)
        .map(|q| q.company_name.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(bare);

    // The plot gets what header, statistics and footer leave over.
    let area = f.area();
    let plot_rows = settings
        .plot_height
        .saturating_add(2)
        .min(area.height.saturating_sub(HEADER_ROWS + STATS_ROWS + 1));
    let plot_cols = settings.plot_width.saturating_add(2).min(area.width);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_ROWS),
            Constraint::Length(plot_rows),
            Constraint::Length(STATS_ROWS),
            Constraint::Min(0),
            Constraint::Length(1), // Footer
        ])
        .split(area);

    let header = Paragraph::new(Line::from(vec![
        Span::styled(format!("Price Chart: {}", bare), Style::default().fg(Color::Cyan).bold()),
        Span::raw(format!("  {} ({})", name, currency)),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(header, chunks[0]);

    let plot_area = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(plot_cols), Constraint::Min(0)])
        .split(chunks[1])[0];

    let history = app.history();
    if history.has_sufficient_data(symbol, MIN_CHART_POINTS) {
        let samples = history.samples(symbol);
        render_price_chart(f, &samples, currency, plot_area);
        render_chart_stats(f, &samples, currency, app.item(symbol), chunks[2]);
    } else {
        render_insufficient_data(f, history.len(symbol), plot_area);
    }

    render_footer(f, chunks[4], " Esc/Enter=Back to table | Ctrl+C=Quit ");
}

fn render_insufficient_data(f: &mut Frame, collected: usize, area: Rect) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled("  Insufficient data to draw a chart.", Style::default().fg(Color::Yellow))),
        Line::from(format!(
            "  {} of {} samples collected, more arrive with each refresh.",
            collected, MIN_CHART_POINTS
        )),
    ];
    let paragraph = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(" Price History "));
    f.render_widget(paragraph, area);
}

fn render_price_chart(f: &mut Frame, samples: &[HistorySample], currency: &str, area: Rect) {
    let data: Vec<(f64, f64)> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| (i as f64, s.price))
        .collect();

    let (low, high) = price_bounds(samples);
    // A flat series still needs a non-empty y range.
    let pad = if high > low { (high - low) * 0.05 } else { high.abs() * 0.01 + 0.01 };
    let (min_y, max_y) = (low - pad, high + pad);
    let max_x = (samples.len() - 1) as f64;

    let first = samples.first().map(|s| s.timestamp.format("%H:%M:%S").to_string()).unwrap_or_default();
    let last = samples.last().map(|s| s.timestamp.format("%H:%M:%S").to_string()).unwrap_or_default();

    let datasets = vec![Dataset::default()
        .name("Price")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&data)];

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(format!(" Price History ({}) ", currency)))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, max_x])
                .labels(vec![Span::raw(first), Span::raw(last)]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([min_y, max_y])
                .labels(vec![
                    Span::raw(format!("{:.2}", low)),
                    Span::raw(format!("{:.2}", (low + high) / 2.0)),
                    Span::raw(format!("{:.2}", high)),
                ]),
        );

    f.render_widget(chart, area);
}

fn price_bounds(samples: &[HistorySample]) -> (f64, f64) {
    samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.price), hi.max(s.price))
    })
}

fn render_chart_stats(f: &mut Frame, samples: &[HistorySample], currency: &str, item: Option<&WatchItem>, area: Rect) {
    let (low, high) = price_bounds(samples);
    let first = samples.first().map(|s| s.price).unwrap_or_default();
    let current = samples.last().map(|s| s.price).unwrap_or_default();
    let change = current - first;
    let change_pct = if first != 0.0 { change / first * 100.0 } else { 0.0 };
    let (arrow, change_color) = if change >= 0.0 { ("▲", Color::Green) } else { ("▼", Color::Red) };

    let mut lines = vec![
        Line::from(vec![
            Span::raw("  Current:     "),
            Span::styled(format!("{:.2} {}", current, currency), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("  High:        "),
            Span::styled(format!("{:.2} {}", high, currency), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("  Low:         "),
            Span::styled(format!("{:.2} {}", low, currency), Style::default().fg(Color::Red)),
        ]),
        Line::from(vec![
            Span::raw("  Change:      "),
            Span::styled(format!("{} {:+.2} ({:+.2}%)", arrow, change, change_pct), Style::default().fg(change_color)),
        ]),
        Line::from(format!("  Data points: {}", samples.len())),
    ];

    if let Some(item) = item {
        let pnl = ProfitLoss::compute(item.purchase_price, Some(current));
        if let ProfitLoss::Position { .. } = pnl {
            let (percent, amount) = format_pnl(&pnl, currency);
            lines.push(Line::from(vec![
                Span::raw(format!("  P/L vs {:.2}: ", item.purchase_price)),
                Span::styled(format!("{} ({})", amount, percent), Style::default().fg(pnl_color(&pnl))),
            ]));
        }
    }

    let stats = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Statistics ")
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(stats, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{app_with, app_with_settings, items, ok_result, runtime};
    use crate::config::Settings;
    use crate::input::KeyAction;
    use crate::quote::tests::MockProvider;
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};

    fn buffer_text(buffer: &Buffer) -> String {
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 45)).unwrap();
        terminal.draw(|f| draw(f, app, Instant::now())).unwrap();
        buffer_text(terminal.backend().buffer())
    }

    fn line_with<'a>(screen: &'a str, needle: &str) -> &'a str {
        screen.lines().find(|l| l.contains(needle)).unwrap_or("")
    }

    #[test]
    fn test_format_pnl_blank_when_not_applicable() {
        assert_eq!(format_pnl(&ProfitLoss::NotApplicable, "PLN"), (String::new(), String::new()));
    }

    #[test]
    fn test_format_pnl_signs() {
        let profit = ProfitLoss::compute(45.50, Some(45.80));
        assert_eq!(format_pnl(&profit, "PLN"), ("+0.66%".to_string(), "+0.30 PLN".to_string()));
        let loss = ProfitLoss::compute(55.20, Some(54.50));
        assert_eq!(format_pnl(&loss, "PLN"), ("-1.27%".to_string(), "-0.70 PLN".to_string()));
    }

    #[test]
    fn test_table_marks_selected_row_and_formats_quotes() {
        let rt = runtime();
        let mut app = app_with(MockProvider::new(), items(&[("PKO", 45.50), ("CDR", 0.0)]), &rt);
        app.apply_result(ok_result(1, "PKO.WA", 45.80));
        app.apply_result(ok_result(1, "CDR.WA", 120.0));

        let screen = render(&app);
        let pko = line_with(&screen, "PKO");
        assert!(pko.contains(SELECTION_MARKER));
        assert!(pko.contains("45.80"));
        assert!(pko.contains("+0.66%"));
        assert!(pko.contains("+0.30 PLN"));

        let cdr = line_with(&screen, "CDR");
        assert!(!cdr.contains(SELECTION_MARKER));
        assert!(cdr.contains("120.00"));
        assert!(!cdr.contains('%'));
    }

    #[test]
    fn test_error_row_shows_placeholder() {
        let rt = runtime();
        let mut app = app_with(MockProvider::new(), items(&[("PKO", 45.50)]), &rt);
        let mut failed = ok_result(1, "PKO.WA", 0.0);
        failed.quote = Quote::failed("PKO.WA", "fetch failed: timeout".to_string());
        app.apply_result(failed);

        let screen = render(&app);
        let row = line_with(&screen, "PKO");
        assert!(row.contains("ERROR"));
        assert!(row.contains("fetch failed"));
        assert!(!row.contains('%'));
    }

    #[test]
    fn test_table_shows_countdown_and_keys() {
        let rt = runtime();
        let app = app_with(MockProvider::new(), items(&[("PKO", 0.0)]), &rt);
        let screen = render(&app);
        assert!(screen.contains("Next refresh in"));
        assert!(screen.contains("Enter=Chart"));
    }

    #[test]
    fn test_chart_with_one_sample_reports_insufficient_data() {
        let rt = runtime();
        let mut app = app_with(MockProvider::new(), items(&[("PKO", 0.0)]), &rt);
        app.apply_result(ok_result(1, "PKO.WA", 45.80));
        app.handle_action(KeyAction::Select);

        let screen = render(&app);
        assert!(screen.contains("Insufficient data"));
        assert!(screen.contains("1 of 2 samples"));
        assert!(!screen.contains("Statistics"));
    }

    #[test]
    fn test_chart_with_history_draws_plot_and_stats() {
        let rt = runtime();
        let mut app = app_with(MockProvider::new(), items(&[("PKO", 45.0)]), &rt);
        for (tick, price) in [(1, 44.0), (2, 45.5), (3, 46.0)] {
            app.apply_result(ok_result(tick, "PKO.WA", price));
        }
        app.handle_action(KeyAction::Select);

        let screen = render(&app);
        assert!(!screen.contains("Insufficient data"));
        assert!(screen.contains("Price Chart: PKO"));
        assert!(screen.contains("Statistics"));
        assert!(screen.contains("Data points: 3"));
        assert!(screen.contains("46.00 PLN"));
        assert!(screen.contains("44.00 PLN"));
    }

    #[test]
    fn test_flat_history_still_renders() {
        let rt = runtime();
        let mut app = app_with(MockProvider::new(), items(&[("PKO", 0.0)]), &rt);
        app.apply_result(ok_result(1, "PKO.WA", 45.0));
        app.apply_result(ok_result(2, "PKO.WA", 45.0));
        app.handle_action(KeyAction::Select);

        let screen = render(&app);
        assert!(screen.contains("Change:      ▲ +0.00 (+0.00%)"));
    }

    #[test]
    fn test_oversized_plot_dimensions_fit_the_screen() {
        let rt = runtime();
        let settings = Settings {
            plot_width: u16::MAX,
            plot_height: u16::MAX,
            ..Settings::default()
        };
        let mut app = app_with_settings(MockProvider::new(), items(&[("PKO", 0.0)]), settings, &rt);
        for (tick, price) in [(1, 44.0), (2, 45.0)] {
            app.apply_result(ok_result(tick, "PKO.WA", price));
        }
        app.handle_action(KeyAction::Select);

        let screen = render(&app);
        assert!(screen.contains("Price Chart: PKO"));
        assert!(screen.contains("Statistics"));
        assert!(screen.contains("Esc/Enter=Back"));
    }
}
