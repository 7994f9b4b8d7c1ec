use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new task
    Add {
        #[arg(value_name = "TITLE")]
        title: String,
        /// Category label (Personal, Work, Study, Groceries, Health, or any other)
        #[arg(short, long, default_value = "Personal")]
        label: String,
        /// 0 = Low, 1 = Medium, 2 = High
        #[arg(short, long, default_value_t = 0)]
        priority: i64,
    },
    /// List tasks, with search/filter/sort applied
    List {
        /// Keep only tasks whose title contains this text (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,
        /// Keep only tasks with this exact label ("All" keeps everything)
        #[arg(short, long, default_value = "All")]
        label: String,
        /// One of: newest, oldest, priority-high, priority-low
        #[arg(short = 'o', long, default_value = "newest")]
        sort: String,
        /// Print the list as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a single task by id
    Show {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Edit a task's title, label, or priority
    Edit {
        #[arg(value_name = "ID")]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Toggle a task's completion flag
    Done {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Delete a task by id
    Rm {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Launch TUI interface
    Tui,
    /// Generate shell completions
    Completions {
        #[arg(value_name = "SHELL")]
        shell: String,
    },
}
