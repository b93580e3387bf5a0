use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::*;
use env_logger::Env;

use audit_dash::backend::{self, AppState, Fixture};
use audit_dash::client::BackendClient;
use audit_dash::config::{Cli, Command};
use audit_dash::dashboard::{ActionOutcome, Dashboard, FullAuditStart};
use audit_dash::terminal::LogLine;
use audit_dash::view::{Style, ViewModel};

#[tokio::main]
async fn main() -> ExitCode {
    // Panel lines are printed below; keep their log mirror quiet by default.
    env_logger::Builder::from_env(Env::default().default_filter_or("info,audit_dash::terminal=off")).init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let (url, save_report) = match &cli.command {
        Command::ServeFixture {
            bind, fixture, ui, ..
        } => {
            let fixture = match fixture {
                Some(path) => Fixture::load(path)?,
                None => Fixture::sample(),
            };
            let options = cli.command.fixture_options().unwrap_or_default();
            let state = AppState::new(fixture, options);
            println!("Fixture backend at http://{bind} (Ctrl+C to stop)");
            tokio::select! {
                r = backend::spawn_server(bind, state, ui.as_deref()) => r?,
                _ = tokio::signal::ctrl_c() => {}
            }
            return Ok(ExitCode::SUCCESS);
        }
        Command::Audit { url, save_report } | Command::Fullscan { url, save_report } => {
            (url.clone(), *save_report)
        }
        Command::Scrape { url } => (url.clone(), false),
    };

    print_config(&cli);
    let client = BackendClient::new(&cli.backend, cli.request_timeout())?;
    let mut dash = Dashboard::new(client, cli.poll_config(), cli.report_dir.clone());
    dash.set_url_input(url);

    let outcome = match &cli.command {
        Command::Audit { .. } => dash.start_audit().await,
        Command::Fullscan { .. } => {
            // Ctrl+C cancels the poll; the outcome is still reported.
            match dash.start_full_audit().await {
                FullAuditStart::Polling(pending) => {
                    let token = pending.cancel_token();
                    tokio::spawn(async move {
                        let _ = tokio::signal::ctrl_c().await;
                        token.cancel();
                    });
                    dash.finish_full_audit(pending).await
                }
                FullAuditStart::Finished(o) => o,
            }
        }
        _ => dash.start_scrape().await,
    };

    if outcome == ActionOutcome::Completed && save_report {
        dash.download_report();
    }

    if !dash.view().is_empty() {
        print_view(dash.view());
    }
    println!();
    for line in dash.panel_mut().take_new() {
        print_log_line(&line);
    }

    Ok(match outcome {
        ActionOutcome::Completed => ExitCode::SUCCESS,
        ActionOutcome::Alert(msg) => {
            eprintln!("{}", msg.yellow().bold());
            ExitCode::from(2)
        }
        _ => ExitCode::FAILURE,
    })
}

fn print_config(cli: &Cli) {
    println!("audit-dash configuration:");
    println!("  backend       : {}", cli.backend);
    println!("  timeout_ms    : {}", cli.timeout_ms);
    println!(
        "  poll          : delay {}ms, every {}ms, max {} checks / {}s",
        cli.poll_delay_ms, cli.poll_interval_ms, cli.max_poll_attempts, cli.max_poll_secs
    );
    println!("  report_dir    : {}", cli.report_dir.display());
}

fn print_view(view: &ViewModel) {
    let id_w = view.iter().map(|(id, _)| id.len()).max().unwrap_or(5).max("field".len());
    println!("\n{:<id_w$}  {}", "field", "value", id_w = id_w);
    println!("{:-<id_w$}  {:-<5}", "", "", id_w = id_w);
    for (id, field) in view.iter() {
        let text = match field.style {
            Style::Present | Style::Complete | Style::Enabled => field.text.green().bold(),
            Style::Missing => field.text.red().bold(),
            Style::Plain => field.text.normal(),
        };
        println!("{:<id_w$}  {}", id, text, id_w = id_w);
    }
}

fn print_log_line(line: &LogLine) {
    let msg = line.message.color(line.severity.color());
    println!("{} {}", format!("[{}]", line.time).dimmed(), msg);
}
