use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use xpqe_core::dispatch::{DispatchSettings, Dispatcher};
use xpqe_core::history::FileQueryHistory;
use xpqe_core::profiles::FileProfilesStore;
use xpqe_core::render::ResultView;
use xpqe_core::settings::Settings;

fn query_text_from_args(args: impl Iterator<Item = String>) -> Option<String> {
    let joined = args.collect::<Vec<_>>().join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn query_text_from_stdin() -> std::io::Result<Option<String>> {
    let input = std::io::read_to_string(std::io::stdin())?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

fn render_table(view: &ResultView) -> String {
    let mut output = String::new();
    if !view.columns().is_empty() {
        output.push_str(&view.columns().join("\t"));
        output.push('\n');
    }
    for row in view.rows() {
        let line = row
            .cells
            .iter()
            .map(xpqe_core::engine::CellValue::display)
            .collect::<Vec<_>>()
            .join("\t");
        output.push_str(&line);
        output.push('\n');
    }
    output.push_str(&view.summary());
    output
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let query = match query_text_from_args(std::env::args().skip(1)) {
        Some(query) => query,
        None => match query_text_from_stdin() {
            Ok(Some(query)) => query,
            Ok(None) => {
                eprintln!("usage: xpqe-app \"@profile: SELECT ...\" (or query text on stdin)");
                return ExitCode::from(2);
            }
            Err(error) => {
                eprintln!("failed to read query text from stdin: {error}");
                return ExitCode::FAILURE;
            }
        },
    };

    let settings = match Settings::load_default() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };
    let store = match FileProfilesStore::load_default() {
        Ok(store) => store,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };
    let history = match FileQueryHistory::load_default() {
        Ok(history) => history,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let mut dispatcher = Dispatcher::new(
        xpqe_adapters::default_registry(),
        store,
        DispatchSettings::from(settings),
    )
    .with_history(history);

    let exit_code = match dispatcher.dispatch(&query).await {
        Ok(view) => {
            println!("{}", render_table(&view));
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    };

    dispatcher.shutdown().await;
    exit_code
}
