use crate::client::AppSnapshot;
use alloy::primitives::{
    Address,
    U256,
    utils::format_ether,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use lottery_client::participation::{
    Busy,
    ViewState,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Participate,
    NextAccount,
    Refresh,
    Redraw,
}

#[derive(Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // one persistent Terminal keeps the diffing buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Reads terminal events on a blocking thread and forwards them.
pub fn input_event_stream() -> InputEventReceiver {
    let (sender, receiver) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if sender.send(event).is_err() || failed {
                break;
            }
        }
    });
    receiver
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn interpret_event(_state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(k) if k.kind == KeyEventKind::Press => match k.code {
            KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(UserEvent::Quit)
            }
            KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
            KeyCode::Char('p') => Some(UserEvent::Participate),
            KeyCode::Char('a') => Some(UserEvent::NextAccount),
            KeyCode::Char('r') => Some(UserEvent::Refresh),
            _ => None,
        },
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        _ => None,
    }
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

fn ui(f: &mut Frame, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // session
            Constraint::Length(9), // lottery
            Constraint::Min(5),    // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_session_panel(f, chunks[0], snap);
    draw_lottery_panel(f, chunks[1], snap);
    draw_status(f, chunks[2], snap);
    draw_help(f, chunks[3], snap);
    draw_notifications(f, snap);
}

fn draw_session_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let session = &snap.session;
    let network = match (session.chain_id, snap.network_name) {
        (Some(id), Some(name)) => format!("{name} ({id})"),
        (Some(id), None) => id.to_string(),
        (None, _) => String::from("N/A"),
    };
    let account = session
        .account
        .map(|a| short_address(&a))
        .unwrap_or_else(|| String::from("N/A"));
    let balance = snap
        .view
        .snapshot()
        .and_then(|s| s.account_balance)
        .map(format_eth)
        .unwrap_or_else(|| String::from("?"));
    let connection = if session.is_connected {
        "Connected"
    } else {
        "Disconnected"
    };
    let text = format!(
        "{connection} | RPC: {} | Network: {network} | Account: {account} ({}/{}) | Balance: {balance} ETH",
        snap.rpc_url,
        snap.account_index + 1,
        snap.account_count,
    );
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_lottery_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (lines, style): (Vec<Line>, Style) = match &snap.view {
        ViewState::Disconnected => (
            vec![Line::from("Please connect a wallet")],
            Style::default(),
        ),
        ViewState::Resolving { lottery } => (
            vec![Line::from(format!("Loading lottery at {lottery}..."))],
            Style::default(),
        ),
        ViewState::Unsupported { chain_id } => (
            vec![
                Line::from(format!("No lottery contract deployed on chain {chain_id}.")),
                Line::from("Switch your node or wallet to a supported network."),
            ],
            Style::default().fg(Color::Yellow),
        ),
        ViewState::Ready {
            lottery,
            snapshot,
            busy,
        } => {
            let fee = snapshot
                .participation_fee
                .map(|fee| format!("{} ETH", format_eth(fee)))
                .unwrap_or_else(|| String::from("?"));
            let players = snapshot
                .number_of_players
                .map(|n| n.to_string())
                .unwrap_or_else(|| String::from("?"));
            let round = snapshot
                .raffle_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| String::from("?"));
            let winner = match snapshot.recent_winner {
                Some(w) if w.is_zero() => String::from("none yet"),
                Some(w) => w.to_string(),
                None => String::from("?"),
            };
            let participation = if snapshot.has_current_account_participated {
                "You are participating in this round"
            } else {
                "You are not participating yet"
            };
            let mut lines = vec![
                Line::from(format!("Contract: {lottery}")),
                Line::from(format!("Participation fee: {fee}")),
                Line::from(format!("Players: {players} | Round: {round}")),
                Line::from(format!("Recent winner: {winner}")),
                Line::from(participation),
            ];
            match busy {
                Some(Busy::Submitting) => {
                    lines.push(Line::from("Submitting participation..."))
                }
                Some(Busy::AwaitingConfirmation(pending)) => lines.push(Line::from(
                    format!("Waiting for confirmation of {}", pending.tx_hash),
                )),
                None => {}
            }
            (lines, Style::default())
        }
    };
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Lottery"));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if snap.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in snap.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = snap
            .errors
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|e| Line::from(e.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let participate = if snap.can_participate {
        "p participate"
    } else {
        "p participate (unavailable)"
    };
    let help = Paragraph::new(format!(
        "{participate} | a next account | r refresh | q/Esc quit"
    ))
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_notifications(f: &mut Frame, snap: &AppSnapshot) {
    if snap.notifications.is_empty() {
        return;
    }
    let height = (snap.notifications.len() as u16 * 2 + 2).min(f.area().height);
    let area = top_right_rect(50, height, f.area());
    let mut lines: Vec<Line> = Vec::new();
    for (kind, message) in &snap.notifications {
        lines.push(Line::from(Span::styled(
            kind.title(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(message.clone()));
    }
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title("Notifications"));
    f.render_widget(Clear, area);
    f.render_widget(widget, area);
}

fn top_right_rect(w_percent: u16, height: u16, r: Rect) -> Rect {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(height), Constraint::Min(0)])
        .split(r);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(100 - w_percent),
            Constraint::Percentage(w_percent),
        ])
        .split(rows[0]);
    cols[1]
}

fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

/// Ether amount without trailing zeros, e.g. `0.5` instead of `0.500000000000000000`.
fn format_eth(wei: U256) -> String {
    let formatted = format_ether(wei);
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => formatted,
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crossterm::event::KeyEvent;

    #[test]
    fn format_eth__trims_trailing_zeros() {
        assert_eq!("0.5", format_eth(U256::from(500_000_000_000_000_000u128)));
        assert_eq!("10", format_eth(U256::from(10_000_000_000_000_000_000u128)));
        assert_eq!("0", format_eth(U256::ZERO));
    }

    #[test]
    fn interpret_event__maps_bound_keys() {
        let mut state = UiState::default();
        let key = |code| Event::Key(KeyEvent::new(code, KeyModifiers::NONE));

        assert_eq!(
            Some(UserEvent::Participate),
            interpret_event(&mut state, key(KeyCode::Char('p')))
        );
        assert_eq!(
            Some(UserEvent::NextAccount),
            interpret_event(&mut state, key(KeyCode::Char('a')))
        );
        assert_eq!(
            Some(UserEvent::Quit),
            interpret_event(&mut state, key(KeyCode::Esc))
        );
        assert_eq!(None, interpret_event(&mut state, key(KeyCode::Char('x'))));
    }

    #[test]
    fn short_address__keeps_prefix_and_suffix() {
        let address = Address::repeat_byte(0xab);

        assert_eq!("0xabab…abab", short_address(&address).to_lowercase());
    }
}
