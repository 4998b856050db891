use anyhow::Context;
use clap::{Parser, Subcommand};
use gridpilot::assistant::{build_assistant_graph, standard_registry, AssistantConfig};
use gridpilot::flow::WorkflowState;
use gridpilot::sheets::InMemoryWorkbook;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the assistant a question against a workbook fixture
    Ask {
        /// Path to a YAML workbook fixture
        #[arg(short, long)]
        workbook: PathBuf,

        /// The request, e.g. "What is our IRR?"
        #[arg(short, long)]
        question: String,

        /// Print each executed node as the run progresses
        #[arg(long)]
        trace: bool,

        /// Maximum node executions for the turn
        #[arg(long, default_value_t = 20)]
        step_budget: u32,
    },
    /// List the tools the assistant can call
    Tools {
        /// Path to a YAML workbook fixture
        #[arg(short, long)]
        workbook: PathBuf,
    },
}

fn load_workbook(path: &PathBuf) -> anyhow::Result<Arc<InMemoryWorkbook>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading workbook fixture {}", path.display()))?;
    let workbook = InMemoryWorkbook::from_yaml(&text)
        .with_context(|| format!("parsing workbook fixture {}", path.display()))?;
    Ok(Arc::new(workbook))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Ask {
            workbook,
            question,
            trace,
            step_budget,
        } => {
            let workbook = load_workbook(&workbook)?;
            let registry = Arc::new(standard_registry(workbook));
            let config = AssistantConfig {
                step_budget,
                ..Default::default()
            };
            let graph = build_assistant_graph(registry, config)?;

            let state = WorkflowState::for_user_message(&question);
            let mut final_state = None;
            {
                let mut stream = Box::pin(graph.stream(state));
                while let Some(event) = stream.next().await {
                    if trace {
                        let marker = if event.step.success { "ok" } else { "failed" };
                        println!(
                            "[{}] {} ({}: {})",
                            event.step.step_number, event.node, marker, event.step.result
                        );
                    }
                    final_state = Some(event.state);
                }
            }

            match final_state.and_then(|s| s.last_assistant_message().cloned()) {
                Some(message) => println!("{}", message.content),
                None => println!("(the assistant produced no response)"),
            }
        }
        Commands::Tools { workbook } => {
            let workbook = load_workbook(&workbook)?;
            let registry = standard_registry(workbook);
            for tool in registry.iter() {
                println!("{:<24} {}", tool.name(), tool.description());
            }
        }
    }

    Ok(())
}
