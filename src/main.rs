use anyhow::Result;
use chemviz::api::ApiKind;
use chemviz::chart::summary_text;
use chemviz::config::ClientConfig;
use chemviz::dashboard::Dashboard;
use chemviz::expansion::Toggle;
use chemviz::logging::{log, obj, v_str, Domain, Level};
use chemviz::upload::UploadStatus;
use chemviz::view::{DashboardView, Panel};
use chemviz::DatasetId;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  user <name>      set username
  pass <secret>    set password
  file <path>      select a CSV file
  upload           upload the selected file
  refresh          reload upload history
  list | show      print history (expanded dataset included)
  toggle <id>      expand/collapse a dataset
  report <id>      open a dataset's PDF report
  close            close the report viewer
  help             this text
  quit             exit";

const BAR_WIDTH: usize = 40;

#[derive(Debug, PartialEq)]
enum Command {
    User(String),
    Pass(String),
    File(String),
    Upload,
    Refresh,
    Show,
    Toggle(DatasetId),
    Report(DatasetId),
    Close,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let id = |rest: &str| -> Result<DatasetId, String> {
        rest.parse().map_err(|_| format!("expected a dataset id, got '{}'", rest))
    };
    let cmd = match word {
        "user" => Command::User(rest.to_string()),
        "pass" => Command::Pass(rest.to_string()),
        "file" if !rest.is_empty() => Command::File(rest.to_string()),
        "file" => return Err("usage: file <path>".to_string()),
        "upload" => Command::Upload,
        "refresh" => Command::Refresh,
        "list" | "show" => Command::Show,
        "toggle" => Command::Toggle(id(rest)?),
        "report" => Command::Report(id(rest)?),
        "close" => Command::Close,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(cmd))
}

fn render(dash: &Dashboard, view: &DashboardView) {
    if view.rows.is_empty() {
        println!("No datasets found. Upload a CSV or refresh the history.");
    }
    for row in &view.rows {
        let marker = if row.expanded { "v" } else { ">" };
        println!(
            "{} [{}] {}  ({})",
            marker,
            row.id,
            row.title,
            row.uploaded_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        match &row.panel {
            None => {}
            Some(Panel::Loading) => println!("    Loading summary..."),
            Some(Panel::Unavailable { reason }) => println!("    Summary unavailable: {}", reason),
            Some(Panel::Ready { series, report_url, .. }) => {
                if let Some(summary) = dash.summaries.get(row.id).summary() {
                    for line in summary_text(summary).lines() {
                        println!("    {}", line);
                    }
                }
                for line in series.render_bars(BAR_WIDTH).lines() {
                    println!("    {}", line);
                }
                match report_url {
                    Some(url) => println!("    PDF report: {}", url),
                    None => println!("    PDF report: not generated"),
                }
            }
        }
    }
    if let Some(url) = &view.report {
        println!("[report viewer] {}", url);
    }
}

async fn run_command(dash: &mut Dashboard, cmd: Command) {
    match cmd {
        Command::User(name) => dash.credentials.set_username(&name),
        Command::Pass(secret) => dash.credentials.set_password(&secret),
        Command::File(path) => {
            dash.uploads.select_file(&path);
            println!("Selected {}", path);
        }
        Command::Upload => {
            println!("{}", UploadStatus::Uploading.line());
            match dash.upload().await {
                Ok(outcome) => {
                    println!("{}", outcome.status.line());
                    if let Some(err) = outcome.refresh_error {
                        println!("History not refreshed: {}", err);
                    } else {
                        render(dash, &dash.view());
                    }
                }
                Err(err) => println!("{}", err),
            }
        }
        Command::Refresh => match dash.refresh().await {
            Ok(count) => {
                println!("{} dataset(s)", count);
                render(dash, &dash.view());
            }
            Err(err) => println!("{}", err),
        },
        Command::Show => render(dash, &dash.view()),
        Command::Toggle(id) => match dash.toggle(id) {
            Ok(Toggle::Collapsed(_)) => render(dash, &dash.view()),
            Ok(Toggle::Expanded(_)) => {
                // The console has no event loop, so wait here for the panel.
                let _ = dash.expanded_summary().await;
                render(dash, &dash.view());
            }
            Err(err) => println!("{}", err),
        },
        Command::Report(id) => match dash.open_report(id).await {
            Ok(url) => println!("[report viewer] {}", url),
            Err(err) => println!("{}", err),
        },
        Command::Close => dash.close_report(),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = ClientConfig::from_env();
    let kind = ApiKind::from_config(&cfg);
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("api_base", v_str(&cfg.api_base)),
            ("api", v_str(&format!("{:?}", kind))),
            ("timeout_secs", json!(cfg.timeout_secs)),
        ]),
    );
    let api = kind.build(cfg)?;
    let mut dash = Dashboard::new(api);

    println!("Chemical Equipment Visualizer (type 'help')");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(cmd)) => run_command(&mut dash, cmd).await,
            Ok(None) => {}
            Err(msg) => println!("{}", msg),
        }
    }

    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[("summaries_fetched", json!(dash.summaries.fetch_count()))]),
    );
    Ok(())
}
