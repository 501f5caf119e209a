use crate::app::{App, BoardModal, BoardView, ProjectModal, ResetView};
use crate::form::Form;
use crate::kanban_board::KanbanBoard;
use crate::members::MembersPanel;
use crate::project_list::{ProjectList, ProjectTab};
use crate::route::Route;
use crate::task::TaskStatus;
use crate::token_flow::{FlowState, TokenFlow, TOKEN_LEN};
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

pub fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        app.drain_messages();
        if app.should_quit {
            return Ok(());
        }
        terminal.draw(|f| draw(f, app))?;

        if event::poll(TICK)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Event::Paste(text) => app.handle_paste(&text),
                _ => {}
            }
        }
    }
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(f.area());

    let who = app
        .user
        .as_ref()
        .map(|u| format!("  {} <{}>", u.name, u.email))
        .unwrap_or_default();
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("TaskMate", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(format!("  {}", app.route)),
            Span::styled(who, Style::default().fg(Color::DarkGray)),
        ])),
        chunks[0],
    );

    f.render_widget(
        Paragraph::new(help_line(app)).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );

    let body = chunks[1];
    match app.route {
        Route::Login => {
            let view = &app.login;
            let status = if view.busy { Some("Logging in...") } else { None };
            draw_form(f, body, &view.form, view.error.as_deref(), view.notice.as_deref().or(status));
        }
        Route::Create => {
            let view = &app.register;
            match view.flow.state() {
                FlowState::CollectingCredentials => {
                    let status = view.flow.is_submitting().then_some("Creating account...");
                    draw_form(f, body, &view.form, view.error.as_deref(), status);
                }
                _ => draw_token(f, body, "Verify your account", &view.flow.token, view.flow.notice()),
            }
        }
        Route::Change => draw_reset(f, body, &app.reset),
        Route::Profile => {
            let view = &app.profile;
            match &view.password {
                Some(reset) => draw_reset(f, body, reset),
                None => draw_form(f, body, &view.form, view.error.as_deref(), view.notice.as_deref()),
            }
        }
        Route::Workspace | Route::Dash => match &app.board {
            Some(view) => draw_board(f, body, view),
            None => {
                draw_projects(f, body, &app.projects);
                if let Some(modal) = &app.project_modal {
                    let (form, error) = match modal {
                        ProjectModal::Create { form, error } | ProjectModal::Edit { form, error, .. } => {
                            (form, error)
                        }
                    };
                    let area = popup(body, 60, 50);
                    f.render_widget(Clear, area);
                    draw_form(f, area, form, error.as_deref(), None);
                }
            }
        },
    }
}

fn help_line(app: &App) -> &'static str {
    match app.route {
        Route::Login => "Enter log in | Tab next field | Ctrl-R register | Ctrl-P forgot password | Esc quit",
        Route::Create | Route::Change => "Enter submit | Ctrl-R resend token | Esc back to login",
        Route::Profile if app.profile.password.is_some() => "Enter submit | Ctrl-R resend token | Esc close",
        Route::Profile => "Enter save | Ctrl-P change password | Esc back",
        Route::Workspace | Route::Dash => match &app.board {
            Some(view) if view.board.carrying().is_some() => "Left/Right carry | Space/Enter drop | Esc cancel",
            Some(_) => {
                "arrows move | Space pick up | a add | e edit | d delete | m members | r reload | Esc back"
            }
            None => {
                let manages = app
                    .projects
                    .selected_project()
                    .is_some_and(|p| app.projects.can_manage(p));
                if manages {
                    "Enter open | Tab active/inactive | n new | e edit | t toggle | p profile | L logout | q quit"
                } else {
                    "Enter open | Tab active/inactive | n new | p profile | L logout | q quit"
                }
            }
        },
    }
}

fn popup(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn message_lines<'a>(error: Option<&'a str>, notice: Option<&'a str>) -> Vec<Line<'a>> {
    let mut lines = Vec::new();
    if let Some(error) = error {
        lines.push(Line::styled(error, Style::default().fg(Color::Red)));
    }
    if let Some(notice) = notice {
        lines.push(Line::styled(notice, Style::default().fg(Color::Green)));
    }
    lines
}

fn draw_form(f: &mut Frame, area: Rect, form: &Form, error: Option<&str>, notice: Option<&str>) {
    let mut lines = Vec::new();
    for (i, field) in form.fields.iter().enumerate() {
        let focused = i == form.focus;
        let label_style = if focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let cursor = if focused { "_" } else { "" };
        lines.push(Line::from(vec![
            Span::styled(format!("{:>18}: ", field.label), label_style),
            Span::raw(format!("{}{}", field.display(), cursor)),
        ]));
    }
    lines.push(Line::raw(""));
    let submit_style = if form.is_filled() {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    lines.push(Line::styled("[ Enter ]", submit_style));
    lines.extend(message_lines(error, notice));

    let block = Block::default().title(form.title).borders(Borders::ALL);
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}

fn draw_token(f: &mut Frame, area: Rect, title: &str, flow: &TokenFlow, notice: Option<&str>) {
    let input = flow.input();
    let mut boxes = Vec::with_capacity(TOKEN_LEN * 2);
    for (i, digit) in input.digits().iter().enumerate() {
        let style = if i == input.focus() && !flow.is_verifying() {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        boxes.push(Span::styled(format!("[{}]", digit.unwrap_or(' ')), style));
        boxes.push(Span::raw(" "));
    }

    let mut lines = vec![Line::raw(""), Line::from(boxes).alignment(Alignment::Center), Line::raw("")];
    if flow.is_verifying() {
        lines.push(Line::raw("Verifying...").alignment(Alignment::Center));
    }
    if flow.state() == FlowState::AwaitingToken && flow.can_resend() {
        lines.push(Line::styled("Ctrl-R sends a new token", Style::default().fg(Color::DarkGray)));
    }
    lines.extend(message_lines(flow.error(), notice));

    let block = Block::default().title(title.to_string()).borders(Borders::ALL);
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}

fn draw_reset(f: &mut Frame, area: Rect, view: &ResetView) {
    match view.flow.state() {
        FlowState::CollectingCredentials if view.flow.is_signed_in() => {
            let status = view.flow.is_busy().then_some("Sending token...");
            let block = Block::default().title("Change password").borders(Borders::ALL);
            f.render_widget(
                Paragraph::new(message_lines(view.error.as_deref(), status)).block(block),
                area,
            );
        }
        FlowState::CollectingCredentials => {
            let status = view.flow.is_busy().then_some("Sending token...");
            draw_form(f, area, &view.email, view.error.as_deref(), status);
        }
        FlowState::AwaitingToken => {
            let notice = view.error.as_deref().or(view.flow.notice());
            draw_token(f, area, "Enter the token sent to your email", &view.flow.token, notice)
        }
        FlowState::Verified | FlowState::Done => {
            draw_form(f, area, &view.passwords, view.error.as_deref(), view.flow.notice())
        }
    }
}

fn draw_projects(f: &mut Frame, area: Rect, list: &ProjectList) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let tabs = Tabs::new(vec!["Active", "Inactive"])
        .block(Block::default().borders(Borders::ALL).title("Projects"))
        .select(match list.tab {
            ProjectTab::Active => 0,
            ProjectTab::Inactive => 1,
        })
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, chunks[0]);

    let visible = list.visible();
    let items: Vec<ListItem> = visible
        .iter()
        .map(|p| {
            let manager = if list.can_manage(p) { " *" } else { "" };
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(p.title.as_str(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!("  ({}){}", p.client, manager)),
                ]),
                Line::styled(p.description.as_str(), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();
    let empty = visible.is_empty();
    let title = if list.is_loading() { "Loading..." } else { "" };
    let widget = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    let mut state = ListState::default();
    if !empty {
        state.select(Some(list.selected));
    }
    f.render_stateful_widget(widget, chunks[1], &mut state);

    if let Some(error) = list.error() {
        f.render_widget(Paragraph::new(error).style(Style::default().fg(Color::Red)), chunks[2]);
    } else if empty && !list.is_loading() {
        f.render_widget(Paragraph::new("No projects here yet. Press n to create one."), chunks[2]);
    }
}

fn draw_board(f: &mut Frame, area: Rect, view: &BoardView) {
    let board = &view.board;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let header = vec![
        Line::styled(view.project.title.as_str(), Style::default().add_modifier(Modifier::BOLD)),
        Line::styled(
            format!("{} | {}", view.project.client, view.project.description),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    f.render_widget(Paragraph::new(header), rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Percentage(25); TaskStatus::ALL.len()])
        .split(rows[1]);
    let counts = board.column_counts();

    for (i, status) in TaskStatus::ALL.iter().enumerate() {
        draw_column(f, chunks[i], board, *status, counts[i]);
    }

    let footer = if let Some(error) = board.error() {
        Paragraph::new(error).style(Style::default().fg(Color::Red))
    } else if board.is_loading() {
        Paragraph::new("Loading tasks...")
    } else {
        Paragraph::new("")
    };
    f.render_widget(footer, rows[2]);

    if let Some(modal) = &view.modal {
        draw_board_modal(f, area, board, modal);
    }
}

fn draw_column(f: &mut Frame, area: Rect, board: &KanbanBoard, status: TaskStatus, count: usize) {
    let carry = board.carrying();
    let is_target = carry.is_some_and(|c| c.target == status);
    let selected_column = board.selected_status == status.column();

    let tasks = board.get_tasks_by_status(status);
    let mut items: Vec<ListItem> = tasks
        .iter()
        .filter(|t| carry.map_or(true, |c| c.task_id != t.id))
        .map(|t| {
            let busy = if board.is_busy(&t.id) { " ..." } else { "" };
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(t.title.as_str(), Style::default().fg(Color::White)),
                    Span::styled(busy, Style::default().fg(Color::DarkGray)),
                ]),
                Line::styled(t.description.as_str(), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    if let Some(task) = carry.filter(|_| is_target).and_then(|c| board.task(&c.task_id)) {
        items.push(ListItem::new(Line::styled(
            format!(">> {}", task.title),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )));
    }
    if items.is_empty() {
        items.push(ListItem::new(Line::styled(
            "Drop tasks here",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let border = if is_target {
        Style::default().fg(Color::Yellow)
    } else if selected_column {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("{} ({})", status, count))
                .borders(Borders::ALL)
                .border_style(border),
        )
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED));

    let mut state = ListState::default();
    if selected_column && carry.is_none() && !tasks.is_empty() {
        state.select(Some(board.selected_task));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_board_modal(f: &mut Frame, area: Rect, board: &KanbanBoard, modal: &BoardModal) {
    match modal {
        BoardModal::AddTask { form, error } => {
            let area = popup(area, 60, 40);
            f.render_widget(Clear, area);
            let status = board.is_creating().then_some("Saving...");
            draw_form(f, area, form, error.as_deref(), status);
        }
        BoardModal::EditTask {
            form, status, error, ..
        } => {
            let area = popup(area, 60, 50);
            f.render_widget(Clear, area);
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(3)])
                .split(area);
            draw_form(f, chunks[0], form, error.as_deref(), None);
            let statuses: Vec<&str> = TaskStatus::ALL.iter().map(|s| s.as_str()).collect();
            let tabs = Tabs::new(statuses)
                .select(status.column())
                .block(Block::default().borders(Borders::ALL).title("Status (Ctrl-Left/Right)"))
                .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
            f.render_widget(tabs, chunks[1]);
        }
        BoardModal::ConfirmDelete => {
            let area = popup(area, 50, 25);
            f.render_widget(Clear, area);
            let title = board.delete_prompt().map(|t| t.title.as_str()).unwrap_or("this task");
            let text = vec![
                Line::raw(format!("Delete \"{}\"?", title)),
                Line::raw(""),
                Line::styled("y confirm | n cancel", Style::default().fg(Color::DarkGray)),
            ];
            f.render_widget(
                Paragraph::new(text)
                    .alignment(Alignment::Center)
                    .block(Block::default().title("Delete task").borders(Borders::ALL)),
                area,
            );
        }
        BoardModal::Members { panel, email } => {
            let area = popup(area, 70, 70);
            f.render_widget(Clear, area);
            draw_members(f, area, panel, email);
        }
    }
}

fn draw_members(f: &mut Frame, area: Rect, panel: &MembersPanel, email: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    f.render_widget(
        Paragraph::new(format!("{}_", email)).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Find user by email (Enter)"),
        ),
        chunks[0],
    );

    let found = match panel.found() {
        Some(user) => Line::from(vec![
            Span::styled(format!("{} <{}>", user.name, user.email), Style::default().fg(Color::Green)),
            Span::styled("  Ctrl-A add", Style::default().fg(Color::DarkGray)),
        ]),
        None => Line::raw(""),
    };
    f.render_widget(Paragraph::new(found), chunks[1]);

    let items: Vec<ListItem> = panel
        .members()
        .iter()
        .map(|m| ListItem::new(format!("{} <{}> {:?}", m.name, m.email, m.role)))
        .collect();
    let title = if panel.is_loading() { "Members (loading...)" } else { "Members (Del removes)" };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    if !panel.members().is_empty() {
        state.select(Some(panel.selected));
    }
    f.render_stateful_widget(list, chunks[2], &mut state);

    if let Some(error) = panel.error() {
        f.render_widget(Paragraph::new(error).style(Style::default().fg(Color::Red)), chunks[3]);
    }
}
