//! Console commands standing in for the visit page's controls and the
//! browser signals a real shell would forward.

use crate::{attention::AttentionEvent, AppState};

const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Attention(AttentionEvent),
    ClosePopup,
    Reopen,
    BlockPopups(bool),
    Status,
    Claim,
    Quiz,
    Answer(Vec<usize>),
    Cancel,
    History,
    Balance,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start <campaign>     begin a visit and open the campaign popup
  hide | show          page visibility changes
  blur | focus         host window focus changes
  move                 pointer movement
  close-popup          close the campaign window by hand
  reopen               reopen or focus the campaign window
  block-popups on|off  toggle the popup blocker
  status               show timer state
  claim                claim the reward once the timer is complete
  quiz                 load the campaign quiz
  answer <1,2,..>      submit quiz answers (1-based options)
  cancel               discard the visit
  history              recent visits
  balance              current balance
  quit";

pub fn parse(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Err("empty command".into());
    };
    let rest: Vec<&str> = parts.collect();

    let command = match name {
        "start" => {
            let campaign = rest.first().ok_or("usage: start <campaign>")?;
            Command::Start(campaign.to_string())
        }
        "hide" => Command::Attention(AttentionEvent::VisibilityChanged { hidden: true }),
        "show" => Command::Attention(AttentionEvent::VisibilityChanged { hidden: false }),
        "blur" => Command::Attention(AttentionEvent::FocusLost),
        "focus" => Command::Attention(AttentionEvent::FocusGained),
        "move" => Command::Attention(AttentionEvent::PointerMoved),
        "close-popup" => Command::ClosePopup,
        "reopen" => Command::Reopen,
        "block-popups" => match rest.first().copied() {
            Some("on") => Command::BlockPopups(true),
            Some("off") => Command::BlockPopups(false),
            _ => return Err("usage: block-popups on|off".into()),
        },
        "status" => Command::Status,
        "claim" => Command::Claim,
        "quiz" => Command::Quiz,
        "answer" => Command::Answer(parse_answers(&rest.join(""))?),
        "cancel" => Command::Cancel,
        "history" => Command::History,
        "balance" => Command::Balance,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(command)
}

/// "1,2,1" -> [0, 1, 0]
fn parse_answers(raw: &str) -> Result<Vec<usize>, String> {
    if raw.is_empty() {
        return Err("usage: answer <1,2,..>".into());
    }
    raw.split(',')
        .map(|item| {
            item.trim()
                .parse::<usize>()
                .ok()
                .and_then(|choice| choice.checked_sub(1))
                .ok_or_else(|| format!("'{item}' is not an option number"))
        })
        .collect()
}

pub async fn execute(app: &AppState, command: Command) -> Result<String, String> {
    let controller = &app.controller;
    match command {
        Command::Start(campaign) => controller
            .start_visit(&campaign)
            .await
            .map(|snapshot| {
                format!(
                    "visiting {} ({}s required)",
                    snapshot.campaign_url, snapshot.required_secs
                )
            })
            .map_err(|e| e.user_message()),
        Command::Attention(event) => controller
            .handle_attention(event)
            .await
            .map(|_| String::new())
            .map_err(|e| e.user_message()),
        Command::ClosePopup => Ok(format!("{} window(s) closed", app.host.close_all())),
        Command::Reopen => controller
            .reopen_popup()
            .await
            .map(|_| "popup open".to_string())
            .map_err(|e| e.user_message()),
        Command::BlockPopups(block) => {
            app.host.set_blocking(block);
            Ok(format!("popup blocker {}", if block { "on" } else { "off" }))
        }
        Command::Status => match controller.snapshot().await {
            Some(s) => Ok(format!(
                "{:?} {}/{}s ({}%), {}s remaining, popup {}, claim {}",
                s.phase,
                s.elapsed_secs,
                s.required_secs,
                s.progress_percent,
                s.remaining_secs,
                if s.popup_open { "open" } else { "closed" },
                if controller.can_claim().await { "enabled" } else { "disabled" },
            )),
            None => Ok("no active visit".into()),
        },
        Command::Claim => controller
            .claim_reward()
            .await
            .map(|r| format!("earned {} coins, balance {}", r.coins_earned, r.new_balance))
            .map_err(|e| e.user_message()),
        Command::Quiz => controller
            .fetch_quiz()
            .await
            .map(|quiz| {
                quiz.questions
                    .iter()
                    .enumerate()
                    .map(|(i, q)| {
                        let options: Vec<String> = q
                            .options
                            .iter()
                            .enumerate()
                            .map(|(n, option)| format!("{}) {option}", n + 1))
                            .collect();
                        format!("Q{}: {}  {}", i + 1, q.prompt, options.join("  "))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .map_err(|e| e.user_message()),
        Command::Answer(answers) => controller
            .submit_quiz(answers)
            .await
            .map(|r| {
                format!(
                    "{}/{} correct, {}: earned {} coins, balance {}",
                    r.correct,
                    r.total,
                    r.tier().label(),
                    r.coins_earned,
                    r.new_balance
                )
            })
            .map_err(|e| e.user_message()),
        Command::Cancel => controller
            .cancel_visit()
            .await
            .map(|_| "visit cancelled".to_string())
            .map_err(|e| e.user_message()),
        Command::History => {
            let visits = app
                .cache
                .recent_visits(HISTORY_LIMIT)
                .await
                .map_err(|e| e.to_string())?;
            if visits.is_empty() {
                return Ok("no visits yet".into());
            }
            Ok(visits
                .iter()
                .map(|v| {
                    format!(
                        "{} {} {:?} {}/{}s coins {}",
                        v.started_at.format("%Y-%m-%d %H:%M"),
                        v.campaign_id,
                        v.status,
                        v.elapsed_secs,
                        v.required_secs,
                        v.coins_earned.map(|c| c.to_string()).unwrap_or_else(|| "-".into())
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::Balance => Ok(match app.wallet.balance() {
            Some(balance) => format!("balance {balance}"),
            None => "balance unknown".into(),
        }),
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok("bye".into()),
    }
}
