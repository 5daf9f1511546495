//! Directory, analytics and session commands.

use anyhow::Result;
use facegate_client::{EmotionHistory, UserEntry};

use crate::config::Config;
use crate::verify::backend;

pub async fn users(config: &Config, search: Option<&str>, json: bool) -> Result<bool> {
    let backend = backend(config)?;
    let users = match search {
        Some(query) => backend.search_users(query).await?,
        None => backend.user_list().await?,
    };
    print_users(&users, json)?;
    Ok(true)
}

pub async fn history(config: &Config, days: u32, json: bool) -> Result<bool> {
    let history = backend(config)?.emotion_history(days).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        print!("{}", render_history(&history, days));
    }
    Ok(true)
}

pub async fn logout(config: &Config) -> Result<bool> {
    backend(config)?.logout().await?;
    println!("Logged out");
    Ok(true)
}

pub(crate) fn print_users(users: &[UserEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(users)?);
    } else {
        print!("{}", render_users(users));
    }
    Ok(())
}

fn render_users(users: &[UserEntry]) -> String {
    if users.is_empty() {
        return "No users\n".to_string();
    }
    let width = users.iter().map(|u| u.username.len()).max().unwrap_or(0);
    users
        .iter()
        .map(|u| {
            let emotion = u.latest_emotion.as_deref().unwrap_or("-");
            match &u.emotion_time {
                Some(at) => format!("{:<width$}  {emotion} ({at})\n", u.username),
                None => format!("{:<width$}  {emotion}\n", u.username),
            }
        })
        .collect()
}

fn render_history(history: &EmotionHistory, days: u32) -> String {
    let mut out = format!("Emotion history, last {days} days\n");
    if let (Some(first), Some(last)) = (history.labels.first(), history.labels.last()) {
        out.push_str(&format!("Range: {first} .. {last}\n"));
    }
    for (emotion, total) in history.totals() {
        out.push_str(&format!("  {emotion:<10} {total}\n"));
    }
    if let Some(stats) = &history.stats {
        if let Some(main) = &stats.main_emotion {
            out.push_str(&format!("Main emotion: {main}\n"));
        }
        if let Some(variation) = stats.emotion_variation {
            out.push_str(&format!("Variation: {variation}\n"));
        }
        if let Some(count) = stats.record_count {
            out.push_str(&format!("Records: {count}\n"));
        }
    }
    out
}
