use crate::app::{App, AppView, Panel};
use crate::settings::SettingsField;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};
use speedbridge::TestStatus;

const ACCENT: Color = Color::Rgb(100, 149, 237);
const SUCCESS: Color = Color::Rgb(134, 194, 156);
const SUCCESS_DIM: Color = Color::Rgb(80, 120, 90);
const INFO: Color = Color::Rgb(147, 180, 220);
const INFO_DIM: Color = Color::Rgb(90, 110, 140);
const WARN: Color = Color::Rgb(220, 180, 130);
const ERROR: Color = Color::Rgb(220, 110, 110);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    match app.view {
        AppView::Main => draw_main_view(frame, area, app),
        AppView::Settings => draw_settings_view(frame, area, app),
    }
}

fn draw_main_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(2),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, chunks[0], app);

    if app.expanded {
        draw_expanded(frame, chunks[1], app);
    } else {
        let panels = Layout::horizontal([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(chunks[1]);

        for (panel, area) in [Panel::Download, Panel::Upload, Panel::Ping]
            .into_iter()
            .zip(panels.iter())
        {
            draw_panel(frame, *area, app, panel, app.selected_panel == panel);
        }
    }

    draw_details(frame, chunks[2], app);
    draw_help(frame, chunks[3], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(14),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .split(inner);

    frame.render_widget(
        Paragraph::new("speedbridge")
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        chunks[0],
    );

    let (status, color) = match (&app.error, app.status()) {
        (Some(message), _) => (message.clone(), ERROR),
        (None, TestStatus::Idle) => ("Ready".to_string(), TEXT_MUTED),
        (None, status @ TestStatus::Pinging) => (status.label().to_string(), WARN),
        (None, status @ TestStatus::Downloading) => (status.label().to_string(), SUCCESS),
        (None, status @ TestStatus::Uploading) => (status.label().to_string(), INFO),
        (None, status) => (status.label().to_string(), ACCENT),
    };
    let status = match &app.snapshot.warning {
        Some(warning) if app.error.is_none() => format!("{} · {}", status, warning),
        _ => status,
    };

    frame.render_widget(
        Paragraph::new(status)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(
        Paragraph::new(phase_line(app.status())).alignment(Alignment::Right),
        chunks[2],
    );
}

fn phase_line(status: TestStatus) -> Line<'static> {
    let phases = [
        (TestStatus::Pinging, "ping"),
        (TestStatus::Downloading, "down"),
        (TestStatus::Uploading, "up"),
    ];

    let mut spans = Vec::new();
    for (i, (phase, label)) in phases.iter().enumerate() {
        let style = if status == *phase {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if status == TestStatus::Finished || status.rank() > phase.rank() {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };
        spans.push(Span::styled(*label, style));

        if i < phases.len() - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }
    Line::from(spans)
}

struct PanelData<'a> {
    title: &'static str,
    color: Color,
    dim_color: Color,
    value: String,
    caption: String,
    progress: Option<f64>,
    samples: &'a [f64],
    unit: &'static str,
}

fn panel_data(app: &App, panel: Panel) -> PanelData<'_> {
    let snapshot = &app.snapshot;
    match panel {
        Panel::Download => PanelData {
            title: "Download",
            color: SUCCESS,
            dim_color: SUCCESS_DIM,
            value: format_speed(snapshot.download_speed_mbps),
            caption: format_transferred(snapshot.download_transferred_mb),
            progress: Some(app.phase_progress(TestStatus::Downloading)),
            samples: &app.download_samples,
            unit: "Mbps",
        },
        Panel::Upload => PanelData {
            title: "Upload",
            color: INFO,
            dim_color: INFO_DIM,
            value: format_speed(snapshot.upload_speed_mbps),
            caption: format_transferred(snapshot.upload_transferred_mb),
            progress: Some(app.phase_progress(TestStatus::Uploading)),
            samples: &app.upload_samples,
            unit: "Mbps",
        },
        Panel::Ping => PanelData {
            title: "Latency",
            color: WARN,
            dim_color: WARN,
            value: if snapshot.ping > 0 {
                format!("{} ms", snapshot.ping)
            } else {
                "—".to_string()
            },
            caption: if snapshot.ping > 0 {
                format!("jitter {} ms", snapshot.jitter)
            } else {
                "jitter —".to_string()
            },
            progress: None,
            samples: &app.ping_samples,
            unit: "ms",
        },
    }
}

fn draw_panel(frame: &mut Frame, area: Rect, app: &App, panel: Panel, selected: bool) {
    let data = panel_data(app, panel);
    let border_color = if selected { BORDER_ACTIVE } else { BORDER };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(
            format!(" {} ", data.title),
            Style::default().fg(if selected { data.color } else { TEXT_SECONDARY }),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    frame.render_widget(
        Paragraph::new(data.value)
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        chunks[0],
    );

    match data.progress {
        Some(progress) => draw_progress_bar(frame, chunks[1], progress, data.color, data.dim_color),
        None => frame.render_widget(
            Paragraph::new(data.caption)
                .style(Style::default().fg(TEXT_MUTED))
                .alignment(Alignment::Center),
            chunks[1],
        ),
    }

    draw_sparkline(frame, chunks[2], data.samples, data.color);
}

fn draw_expanded(frame: &mut Frame, area: Rect, app: &App) {
    let data = panel_data(app, app.selected_panel);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_ACTIVE))
        .title(Span::styled(
            format!(" {} ", data.title),
            Style::default().fg(data.color),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(4),
    ])
    .split(inner);

    let (avg, max, min) = get_stats(data.samples);
    let stats = Line::from(vec![
        Span::styled(
            data.value,
            Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(data.caption, Style::default().fg(TEXT_SECONDARY)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(
            format!("avg {:.0} · max {:.0} · min {:.0}", avg, max, min),
            Style::default().fg(TEXT_MUTED),
        ),
    ]);
    frame.render_widget(Paragraph::new(stats).alignment(Alignment::Center), chunks[0]);

    if let Some(progress) = data.progress {
        draw_progress_bar(frame, chunks[1], progress, data.color, data.dim_color);
    }

    draw_detailed_chart(frame, chunks[2], data.samples, data.color, data.unit);
}

fn draw_details(frame: &mut Frame, area: Rect, app: &App) {
    let snapshot = &app.snapshot;
    if snapshot.server.is_empty() {
        return;
    }

    let mut spans = vec![
        Span::styled(snapshot.server.clone(), Style::default().fg(TEXT_SECONDARY)),
        Span::styled(
            format!("  {}", snapshot.server_info),
            Style::default().fg(TEXT_MUTED),
        ),
    ];
    for field in [
        Some(&snapshot.connection_type).filter(|s| !s.is_empty()),
        snapshot.isp.as_ref(),
        snapshot.ip.as_ref(),
    ]
    .into_iter()
    .flatten()
    {
        spans.push(Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)));
        spans.push(Span::styled(field.clone(), Style::default().fg(TEXT_MUTED)));
    }
    if let Some(loss) = snapshot.packet_loss_percent {
        spans.push(Span::styled(
            format!("  ·  loss {:.1}%", loss),
            Style::default().fg(TEXT_MUTED),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        area,
    );
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio * width as f64) as usize).min(width);
    let empty = width.saturating_sub(filled);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(color)),
        Span::styled("━".repeat(empty), Style::default().fg(dim_color)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_sparkline(frame: &mut Frame, area: Rect, data: &[f64], color: Color) {
    if data.is_empty() || area.width < 4 || area.height < 2 {
        return;
    }

    let (min_val, max_val) = get_data_range(data);
    let range = (max_val - min_val).max(1.0);
    let points = to_points(data);

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, data.len() as f64]))
        .y_axis(Axis::default().bounds([min_val - range * 0.1, max_val + range * 0.1]));

    frame.render_widget(chart, area);
}

fn draw_detailed_chart(frame: &mut Frame, area: Rect, data: &[f64], color: Color, unit: &str) {
    if data.is_empty() || area.width < 10 || area.height < 3 {
        return;
    }

    let (min_val, max_val) = get_data_range(data);
    let range = (max_val - min_val).max(0.1);
    let y_min = (min_val - range * 0.1).max(0.0);
    let y_max = max_val + range * 0.1;

    let points = to_points(data);
    let (avg, _, _) = get_stats(data);
    let avg_line = vec![(0.0, avg), (data.len() as f64, avg)];

    let datasets = vec![
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(&points),
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(TEXT_MUTED))
            .data(&avg_line),
    ];

    let y_labels = vec![
        Span::styled(format!("{:.0}", y_min), Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("{:.0} {}", y_max, unit), Style::default().fg(TEXT_MUTED)),
    ];

    let chart = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(BORDER))
                .bounds([0.0, data.len() as f64]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(BORDER))
                .bounds([y_min, y_max])
                .labels(y_labels),
        );

    frame.render_widget(chart, area);
}

fn draw_settings_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(14),
        Constraint::Length(1),
    ])
    .split(area);

    let header_block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));
    let header_inner = header_block.inner(chunks[0]);
    frame.render_widget(header_block, chunks[0]);

    frame.render_widget(
        Paragraph::new("Settings")
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        header_inner,
    );

    let content_area = Layout::horizontal([
        Constraint::Length(2),
        Constraint::Min(30),
        Constraint::Length(2),
    ])
    .split(chunks[1])[1];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));
    let inner = block.inner(content_area);
    frame.render_widget(block, content_area);

    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .split(inner);

    let settings = &app.settings;
    let entries = [
        (SettingsField::DownloadTime, "Download time", format!("{} s", settings.download_secs)),
        (SettingsField::UploadTime, "Upload time", format!("{} s", settings.upload_secs)),
        (SettingsField::DownloadThreads, "Download threads", settings.download_threads.to_string()),
        (SettingsField::UploadThreads, "Upload threads", settings.upload_threads.to_string()),
    ];
    for (row, (field, label, value)) in rows.iter().zip(entries.iter()) {
        draw_setting_row(frame, *row, label, value, app.selected_setting == *field);
    }

    frame.render_widget(
        Paragraph::new("↑↓ select · ←→ adjust · enter done")
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        chunks[2],
    );
}

fn draw_setting_row(frame: &mut Frame, area: Rect, label: &str, value: &str, selected: bool) {
    let chunks = Layout::horizontal([Constraint::Length(20), Constraint::Min(10)]).split(area);

    let label_style = if selected {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(TEXT_SECONDARY)
    };
    frame.render_widget(
        Paragraph::new(format!(" {}", label)).style(label_style),
        chunks[0],
    );

    let (value_text, value_style) = if selected {
        (format!("< {} >", value), Style::default().fg(TEXT_PRIMARY))
    } else {
        (value.to_string(), Style::default().fg(TEXT_MUTED))
    };
    frame.render_widget(Paragraph::new(value_text).style(value_style), chunks[1]);
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.expanded {
        "esc close · q quit"
    } else if app.is_running() {
        "tab select · space expand · esc stop · q quit"
    } else {
        "enter start · s settings · tab select · space expand · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

fn to_points(data: &[f64]) -> Vec<(f64, f64)> {
    data.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect()
}

fn get_data_range(data: &[f64]) -> (f64, f64) {
    let min = data.iter().cloned().fold(f64::MAX, f64::min);
    let max = data.iter().cloned().fold(f64::MIN, f64::max);
    (if min == f64::MAX { 0.0 } else { min }, if max == f64::MIN { 0.0 } else { max })
}

fn get_stats(data: &[f64]) -> (f64, f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let avg = data.iter().sum::<f64>() / data.len() as f64;
    let (min, max) = get_data_range(data);
    (avg, max, min)
}

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.1} Gbps", mbps / 1000.0)
    } else if mbps >= 1.0 {
        format!("{:.1} Mbps", mbps)
    } else if mbps > 0.0 {
        format!("{:.0} Kbps", mbps * 1000.0)
    } else {
        "—".to_string()
    }
}

fn format_transferred(mb: f64) -> String {
    if mb > 0.0 {
        format!("{:.1} MB", mb)
    } else {
        String::new()
    }
}
