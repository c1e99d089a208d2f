use humantime::parse_duration;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Add a new task.
    Add {
        /// The task title.
        #[structopt()]
        title: String,

        /// The task estimated duration, e.g. "30m" or "1h 15m" (45m if omitted).
        #[structopt(short, long, parse(try_from_str=parse_duration))]
        estimate: Option<Duration>,

        /// The task priority, lower comes sooner (2 if omitted).
        #[structopt(short, long, allow_hyphen_values = true)]
        priority: Option<i64>,
    },
    /// Mark a task as done.
    Done {
        #[structopt()]
        id: i64,
    },
    /// Lay out the pending tasks starting now.
    List {
        /// Only keep the tasks that fit in this much time, e.g. "6h".
        #[structopt(short, long, parse(try_from_str=parse_duration))]
        budget: Option<Duration>,
    },
    /// Delete the tasks already done.
    Clear,
    /// List all tasks, newest first, including the done ones.
    History {
        /// Only show tasks whose title contains this text.
        #[structopt()]
        query: Option<String>,
    },
    /// Send a request to the planning assistant.
    Ask {
        /// Read the request from standard input (e.g. a voice transcript).
        #[structopt(long)]
        stdin: bool,

        /// The request text.
        #[structopt()]
        prompt: Vec<String>,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(name = "daylane", about = "A minimalist day planner.")]
pub struct CommandLineArgs {
    #[structopt(subcommand)]
    pub action: Command,

    /// Use a different journal file.
    #[structopt(parse(from_os_str), short, long, env = "DAYLANE_JOURNAL")]
    pub journal_file: Option<PathBuf>,

    /// The assistant endpoint.
    #[structopt(
        long,
        env = "DAYLANE_ASSISTANT_URL",
        default_value = "http://127.0.0.1:8000/ask"
    )]
    pub assistant_url: String,

    /// Text in an assistant answer that means the schedule was rebuilt.
    #[structopt(
        long,
        env = "DAYLANE_REFRESH_MARKER",
        default_value = "Расписание составлено"
    )]
    pub refresh_marker: String,

    /// Seconds to wait for the assistant.
    #[structopt(long, env = "DAYLANE_TIMEOUT", default_value = "60")]
    pub timeout: u64,
}
