use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use pubhub::cli::{
    BookCommand, Cli, Command, PersonaCommand, ScheduleCommand, SchedulerCommand, SiteCommand,
    TemplateCommand,
};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    pubhub::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Book { command } => match command {
            BookCommand::Outline(args) => pubhub::book::outline(args).await.context("book outline")?,
            BookCommand::Write(args) => pubhub::book::write(args).await.context("book write")?,
            BookCommand::Edit(args) => pubhub::book::edit(args).await.context("book edit")?,
        },
        Command::Export(args) => pubhub::export::run(args).await.context("export")?,
        Command::Persona {
            command: PersonaCommand::Analyze(args),
        } => pubhub::persona::analyze(args).await.context("persona analyze")?,
        Command::Site { command } => match command {
            SiteCommand::Add(args) => pubhub::site::add(args).await.context("site add")?,
            SiteCommand::Remove(args) => pubhub::site::remove(args).await.context("site remove")?,
            SiteCommand::Verify(args) => pubhub::site::verify(args).await.context("site verify")?,
            SiteCommand::Analyze(args) => {
                pubhub::site::analyze(args).await.context("site analyze")?
            }
        },
        Command::Template {
            command: TemplateCommand::Add(args),
        } => pubhub::site::add_template(args)
            .await
            .context("template add")?,
        Command::Schedule { command } => match command {
            ScheduleCommand::Add(args) => pubhub::schedule::add(args).await.context("schedule add")?,
            ScheduleCommand::List(args) => {
                pubhub::schedule::list(args).await.context("schedule list")?
            }
        },
        Command::Scheduler {
            command: SchedulerCommand::Run(args),
        } => pubhub::scheduler::run_command(args)
            .await
            .context("scheduler run")?,
    }

    Ok(())
}
