mod state;

use crate::cli::{build_config, Cli};
use crate::engine::EngineClient;
use crate::intake;
use crate::model::{AnalysisResponse, ExportFormat, PipelineEvent, QualityScore};
use crate::orchestrator::{self, UiCommand};
use crate::session::Stage;
use crate::viewmodel;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row as TableRow, Table},
    Frame, Terminal,
};
use state::UiState;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let backend = Arc::new(EngineClient::new(&cfg)?);

    // Unbounded channels: event and command volume is tiny, backpressure
    // would only add latency.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // Upload on launch when a file was given on the command line.
    if let Some(file) = args.file.clone() {
        let _ = cmd_tx.send(UiCommand::Upload(file));
    }

    // Terminal I/O is blocking, so the render loop gets its own thread; the
    // controller stays on the runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, event_rx, cmd_tx));

    let _store = orchestrator::run_controller(backend, cfg, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    Ok(())
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<PipelineEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // Display state lives on this thread only; the controller owns the
    // session store.
    let mut state = UiState::default();
    state.info = match &args.file {
        Some(file) => format!("Uploading {}", file.display()),
        None => "No dataset given; restart as `datasweep <file>`".to_string(),
    };

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            state.tick();
            terminal.draw(|f| draw(f, &args, &state)).ok();
            last_tick = Instant::now();
        }

        // Short input poll keeps the render cadence steady.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('u')) => match args.file.clone() {
                        Some(file) => {
                            let _ = cmd_tx.send(UiCommand::Upload(file));
                        }
                        None => {
                            state.info = "No file argument; restart as `datasweep <file>`".into();
                        }
                    },
                    (_, KeyCode::Char('c')) => {
                        if state.busy {
                            state.info = "Still working on the previous action".into();
                        } else if state.stage == Stage::Analyzed {
                            let _ = cmd_tx.send(UiCommand::AutoClean);
                        } else {
                            state.info = "Nothing to clean; upload a dataset first".into();
                        }
                    }
                    (_, KeyCode::Char('d')) => {
                        send_download(&mut state, &cmd_tx, ExportFormat::Csv);
                    }
                    (_, KeyCode::Char('x')) => {
                        send_download(&mut state, &cmd_tx, ExportFormat::Excel);
                    }
                    (_, KeyCode::Char('p')) => {
                        if state.stage == Stage::Completed && !state.busy {
                            let _ = cmd_tx.send(UiCommand::RefreshPreview);
                        }
                    }
                    (_, KeyCode::Char('a')) => {
                        state.show_all_issues = !state.show_all_issues;
                    }
                    (_, KeyCode::Char('r')) => {
                        let _ = cmd_tx.send(UiCommand::Reset);
                        state.info = "Starting over".into();
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// Gate download keys on a completed session; the controller guards too, but
/// a local hint reads better than a surfaced sequence error.
fn send_download(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, format: ExportFormat) {
    if state.busy {
        state.info = "Still working on the previous action".into();
    } else if state.stage == Stage::Completed {
        let _ = cmd_tx.send(UiCommand::Download(format));
    } else {
        state.info = "Download is available after cleaning completes".into();
    }
}

fn draw(f: &mut Frame, args: &Cli, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], state);
    match state.stage {
        Stage::Empty => draw_empty(f, chunks[1], args, state),
        Stage::Analyzed | Stage::Cleaning => draw_analysis(f, chunks[1], state),
        Stage::Completed => draw_results(f, chunks[1], state),
    }
    draw_status(f, chunks[2], state);
}

fn draw_header(f: &mut Frame, area: Rect, state: &UiState) {
    let active = match state.stage {
        Stage::Empty => 0,
        Stage::Analyzed => 1,
        Stage::Cleaning => 2,
        Stage::Completed => 3,
    };
    let mut spans: Vec<Span> = Vec::new();
    for (i, step) in ["Upload", "Analyze", "Clean", "Results"].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" -> "));
        }
        let style = if i == active {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(*step, style));
    }
    let header = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("datasweep"));
    f.render_widget(header, area);
}

fn draw_empty(f: &mut Frame, area: Rect, args: &Cli, state: &UiState) {
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Upload your dataset",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(intake::advisory_note()),
        Line::from(""),
    ];
    match &args.file {
        Some(file) => lines.push(Line::from(format!("'u' uploads {}", file.display()))),
        None => lines.push(Line::from(
            "Restart as `datasweep <file>` to choose a dataset",
        )),
    }
    if state.busy {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("{} Uploading...", state.spinner_frame())));
    }
    let body = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(body, area);
}

fn draw_analysis(f: &mut Frame, area: Rect, state: &UiState) {
    let Some(analysis) = &state.analysis else {
        let waiting = Paragraph::new("Waiting for analysis...")
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(waiting, area);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    draw_dataset_card(f, top[0], analysis);
    draw_issue_list(f, top[1], state, analysis);
    draw_preview_table(
        f,
        rows[1],
        &analysis.dataset_info.column_names,
        &analysis.preview_data,
        "Data Preview",
    );
}

fn draw_dataset_card(f: &mut Frame, area: Rect, analysis: &AnalysisResponse) {
    let info = &analysis.dataset_info;
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(4)])
        .split(area);

    let kv = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
            Span::raw(value),
        ])
    };
    let lines = vec![
        kv("File", info.filename.clone().unwrap_or_else(|| "-".into())),
        kv("Rows", info.rows.to_string()),
        kv("Columns", info.columns.to_string()),
        kv("Size", format!("{:.1} KB", info.size_kb)),
    ];
    let card =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Dataset"));
    f.render_widget(card, parts[0]);

    draw_quality(f, parts[1], &info.quality_score);
}

fn draw_quality(f: &mut Frame, area: Rect, score: &QualityScore) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Quality {:.0}/100", score.overall));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1); 4])
        .split(inner);
    let axes = [
        ("Completeness", score.completeness),
        ("Uniqueness", score.uniqueness),
        ("Consistency", score.consistency),
        ("Accuracy", score.accuracy),
    ];
    for (i, (label, value)) in axes.iter().enumerate() {
        if i >= rows.len() {
            break;
        }
        let gauge = Gauge::default()
            .ratio((value / 100.0).clamp(0.0, 1.0))
            .label(format!("{label} {value:.0}%"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black));
        f.render_widget(gauge, rows[i]);
    }
}

fn draw_issue_list(f: &mut Frame, area: Rect, state: &UiState, analysis: &AnalysisResponse) {
    let title = format!("Issues Detected ({})", analysis.issues.len());
    let mut items: Vec<ListItem> = Vec::new();
    if state.show_all_issues {
        for issue in &analysis.issues {
            items.push(ListItem::new(viewmodel::issue_line(issue)));
        }
    } else {
        let view = viewmodel::compact_issues(&analysis.issues);
        for issue in view.visible {
            items.push(ListItem::new(viewmodel::issue_line(issue)));
        }
        if let Some(more) = viewmodel::more_indicator(view.hidden) {
            items.push(ListItem::new(Span::styled(
                format!("{more} ('a' shows all)"),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    if items.is_empty() {
        items.push(ListItem::new("No issues detected"));
    }
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, area);
}

fn draw_preview_table(
    f: &mut Frame,
    area: Rect,
    columns: &[String],
    rows: &[crate::model::Row],
    title: &str,
) {
    let visible = viewmodel::preview_rows(rows);
    let header = TableRow::new(columns.iter().map(|c| {
        Cell::from(Span::styled(
            c.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ))
    }));
    let body = visible.iter().map(|row| {
        TableRow::new(columns.iter().map(|c| {
            let text = match row.get(c) {
                Some(v) => viewmodel::cell_text(v),
                None => "N/A".to_string(),
            };
            Cell::from(text)
        }))
    });
    let widths = vec![Constraint::Min(8); columns.len().max(1)];
    let table = Table::new(body, widths).header(header).block(
        Block::default().borders(Borders::ALL).title(format!(
            "{title} (showing {} of {})",
            visible.len(),
            rows.len()
        )),
    );
    f.render_widget(table, area);
}

fn draw_results(f: &mut Frame, area: Rect, state: &UiState) {
    let Some(results) = &state.results else {
        let waiting = Paragraph::new("Waiting for the cleaning report...")
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(waiting, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Percentage(45),
            Constraint::Min(5),
        ])
        .split(area);

    let delta_line = Line::from(vec![
        Span::raw(format!("{:.1}", results.quality_before)),
        Span::raw(" -> "),
        Span::raw(format!("{:.1}", results.quality_after)),
        Span::raw("  "),
        Span::styled(
            viewmodel::format_delta(results.quality_delta),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
    ]);
    let summary = vec![
        Line::from(Span::styled(
            "Cleaning complete",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        delta_line,
        Line::from(format!(
            "{} issue(s) resolved in {:.0} ms, {} rows x {} columns",
            results.issues_resolved, results.processing_time_ms, results.rows, results.columns
        )),
    ];
    let comparison = Paragraph::new(summary).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Quality Comparison"),
    );
    f.render_widget(comparison, chunks[0]);

    let items: Vec<ListItem> = results
        .operations
        .iter()
        .enumerate()
        .map(|(i, op)| {
            ListItem::new(format!(
                "{}. {} - {} ({}, {} rows)",
                i + 1,
                op.column,
                op.description,
                op.applied_by,
                op.rows_affected
            ))
        })
        .collect();
    let report =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Cleaning Report"));
    f.render_widget(report, chunks[1]);

    let columns: Vec<String> = state
        .analysis
        .as_ref()
        .map(|a| a.dataset_info.column_names.clone())
        .unwrap_or_default();
    draw_preview_table(f, chunks[2], &columns, &state.cleaned_preview, "Cleaned Data");
}

fn draw_status(f: &mut Frame, area: Rect, state: &UiState) {
    let mut spans: Vec<Span> = Vec::new();
    if state.busy {
        spans.push(Span::styled(
            format!("{} ", state.spinner_frame()),
            Style::default().fg(Color::Yellow),
        ));
    }
    if let Some(err) = &state.last_error {
        spans.push(Span::styled(err.clone(), Style::default().fg(Color::Red)));
    } else if !state.info.is_empty() {
        spans.push(Span::raw(state.info.clone()));
    }
    let help = "u upload | c clean | d csv | x excel | p preview | a all issues | r start over | q quit";
    let lines = vec![
        Line::from(spans),
        Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))),
    ];
    let status = Paragraph::new(lines).block(Block::default().borders(Borders::TOP));
    f.render_widget(status, area);
}
