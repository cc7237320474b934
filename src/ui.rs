use crate::dates;
use crate::models::{Notice, NoticeKind};
use crate::state::ClientState;
use chrono::NaiveDate;

pub const DONE_MARK: &str = "✓";

pub fn render_page(state: &ClientState, today: NaiveDate, notice: Option<&Notice>) -> String {
    let account = match state.user.as_ref() {
        Some(user) => format!(
            "Signed in as <strong>{}</strong>",
            html_escape(user.email.as_deref().unwrap_or(&user.id))
        ),
        None => "Not signed in".to_string(),
    };

    fill(
        INDEX_HTML,
        &[
            ("NOTICE", render_notice(notice)),
            ("ACCOUNT", account),
            ("TODAY", dates::display(today)),
            ("HABITS", render_habit_list(state, today)),
            ("HISTORY", render_history_table(state, today)),
        ],
    )
}

/// One `<li>` per habit: today's checkbox, the name, and a delete control.
pub fn render_habit_list(state: &ClientState, today: NaiveDate) -> String {
    let day = dates::display(today);
    let mut out = String::new();
    for habit in &state.habits {
        let done = state.history.is_done(&habit.name, &day);
        // Text ids may hold `/`, `?` or `#`; keep them one path segment.
        let id = html_escape(&urlencoding::encode(&habit.id.to_string()));
        out.push_str(&format!(
            r#"<li>
  <form method="post" action="/habits/{id}/today" class="toggle">
    <input type="hidden" name="done" value="{next}" />
    <input type="checkbox" onchange="this.form.submit()"{checked} />
  </form>
  <span class="habit-name">{name}</span>
  <form method="post" action="/habits/{id}/delete" class="delete">
    <button type="submit" title="Delete">x</button>
  </form>
</li>
"#,
            next = !done,
            checked = if done { " checked" } else { "" },
            name = html_escape(&habit.name),
        ));
    }
    out
}

/// Header row of the trailing window (newest first) plus one row per habit.
pub fn render_history_table(state: &ClientState, today: NaiveDate) -> String {
    let days: Vec<String> = dates::last_30_days_at(today)
        .into_iter()
        .map(dates::display)
        .collect();

    let mut out = String::from("<tr><th>Habit</th>");
    for day in &days {
        out.push_str(&format!("<th>{day}</th>"));
    }
    out.push_str("</tr>\n");

    for habit in &state.habits {
        out.push_str(&format!("<tr><td>{}</td>", html_escape(&habit.name)));
        for day in &days {
            let mark = if state.history.is_done(&habit.name, day) {
                DONE_MARK
            } else {
                ""
            };
            out.push_str(&format!("<td>{mark}</td>"));
        }
        out.push_str("</tr>\n");
    }
    out
}

fn render_notice(notice: Option<&Notice>) -> String {
    match notice {
        Some(notice) => {
            let class = match notice.kind {
                NoticeKind::Info => "notice info",
                NoticeKind::Error => "notice error",
            };
            format!(
                r#"<div class="{class}" id="notice" role="alert">{}</div>"#,
                html_escape(&notice.message)
            )
        }
        None => String::new(),
    }
}

/// Substitutes `{{KEY}}` placeholders in one pass, so inserted values are
/// never scanned for placeholders themselves.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match values.iter().find(|(name, _)| *name == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Habit Tracker</title>
  <style>
    :root {
      --bg-1: #f8f3e6;
      --bg-2: #f5d3a7;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(1100px, 100%);
      background: var(--card);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 24px;
    }

    h1 {
      font-family: "Georgia", serif;
      margin: 0;
    }

    .subtitle {
      margin: 0;
      color: #5f5c57;
    }

    form.inline {
      display: flex;
      flex-wrap: wrap;
      gap: 10px;
      align-items: center;
    }

    input[type="email"], input[type="password"], input[type="text"] {
      border: 1px solid rgba(47, 72, 88, 0.2);
      border-radius: 999px;
      padding: 10px 16px;
      font-size: 1rem;
    }

    button {
      border: none;
      border-radius: 999px;
      padding: 10px 18px;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent-2);
      color: white;
    }

    button.primary {
      background: var(--accent);
    }

    .notice {
      border-radius: 14px;
      padding: 12px 16px;
    }

    .notice.info {
      background: rgba(47, 72, 88, 0.1);
    }

    .notice.error {
      background: rgba(255, 107, 74, 0.18);
      color: #8a2a14;
    }

    #acthabits {
      list-style: none;
      margin: 0;
      padding: 0;
      display: grid;
      gap: 8px;
    }

    #acthabits li {
      display: flex;
      align-items: center;
      gap: 10px;
    }

    #acthabits form {
      margin: 0;
    }

    #acthabits .delete button {
      padding: 2px 10px;
      background: transparent;
      color: var(--accent);
    }

    .table-wrap {
      overflow-x: auto;
    }

    .history-table {
      border-collapse: collapse;
      font-size: 0.85rem;
    }

    .history-table th, .history-table td {
      border: 1px solid rgba(47, 72, 88, 0.12);
      padding: 4px 6px;
      text-align: center;
      min-width: 2.6em;
    }

    .history-table td:first-child {
      text-align: left;
      white-space: nowrap;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>Habit Tracker</h1>
      <p class="subtitle">Today is {{TODAY}} &middot; {{ACCOUNT}}</p>
    </header>

    {{NOTICE}}

    <section>
      <form class="inline" method="post" action="/auth/signin">
        <input type="email" id="email" name="email" placeholder="Email" />
        <input type="password" id="password" name="password" placeholder="Password" />
        <button type="submit" id="signupbtn" formaction="/auth/signup">Sign up</button>
        <button type="submit" id="loginbtn" class="primary">Sign in</button>
      </form>
      <form class="inline" method="post" action="/auth/signout">
        <button type="submit" id="logoutbtn">Sign out</button>
      </form>
    </section>

    <section>
      <form class="inline" method="post" action="/habits">
        <input type="text" id="habitinput" name="name" placeholder="New habit" />
        <button type="submit" id="addhabitbtn" class="primary">Add</button>
      </form>
    </section>

    <section>
      <h2>Today</h2>
      <ul id="acthabits">
{{HABITS}}      </ul>
    </section>

    <section>
      <h2>Last 30 days</h2>
      <div class="table-wrap">
        <table id="historytable" class="history-table">
{{HISTORY}}        </table>
      </div>
    </section>
  </main>
</body>
</html>
"#;
