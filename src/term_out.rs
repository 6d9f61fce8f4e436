use std::io::Write as _;
use std::sync::mpsc;
use std::time::{Duration, Instant};

// A dedicated thread owns stderr so log lines and the progress line do
// not tear each other.

pub(crate) fn init(start: Instant, enable_progress: bool) -> Handle {
    let (sender, receiver) = mpsc::channel();

    let join_handle = std::thread::Builder::new()
        .name("term out".into())
        .spawn(move || thread_main(start, enable_progress, receiver))
        .expect("failed to spawn thread");

    Handle {
        join_handle,
        sender,
    }
}

const UPDATE_PERIOD: Duration = Duration::from_millis(50);

enum Command {
    Finish,
    PrintRawLine(Vec<u8>),
    SetProgress(String),
}

fn thread_main(start: Instant, enable_progress: bool, receiver: mpsc::Receiver<Command>) {
    let mut stderr = std::io::stderr();
    let mut shown: Option<String> = None;
    let mut last_render: Option<Instant> = None;

    loop {
        let finish = match receiver.recv() {
            Ok(Command::Finish) | Err(mpsc::RecvError) => true,
            Ok(Command::PrintRawLine(line)) => {
                if shown.is_some() {
                    handle_err(crossterm::queue!(
                        stderr,
                        crossterm::terminal::Clear(crossterm::terminal::ClearType::CurrentLine),
                        crossterm::cursor::MoveToColumn(0),
                    ));
                }
                handle_err(stderr.write_all(&line));
                if let Some(ref progress) = shown {
                    handle_err(crossterm::queue!(
                        stderr,
                        crossterm::style::Print(render_progress_line(start, progress)),
                    ));
                }
                handle_err(stderr.flush());
                false
            }
            Ok(Command::SetProgress(progress)) => {
                // drop updates arriving faster than the redraw period
                let due = last_render.is_none_or(|at| at.elapsed() >= UPDATE_PERIOD);
                if enable_progress && due {
                    handle_err(crossterm::queue!(
                        stderr,
                        crossterm::cursor::MoveToColumn(0),
                        crossterm::style::Print(render_progress_line(start, &progress)),
                        crossterm::terminal::Clear(crossterm::terminal::ClearType::UntilNewLine),
                    ));
                    handle_err(stderr.flush());
                    shown = Some(progress);
                    last_render = Some(Instant::now());
                }
                false
            }
        };

        if finish {
            if shown.is_some() {
                handle_err(crossterm::queue!(
                    stderr,
                    crossterm::style::Print('\n'),
                    crossterm::cursor::MoveToColumn(0),
                ));
                handle_err(stderr.flush());
            }
            break;
        }
    }
}

fn render_progress_line(start: Instant, line: &str) -> String {
    let elapsed = start.elapsed().as_secs();
    let secs = elapsed % 60;
    let mins = (elapsed / 60) % 60;
    let hours = elapsed / 3600;

    format!("[{hours:02}:{mins:02}:{secs:02}] {line}")
}

fn handle_err<T>(r: std::io::Result<T>) -> T {
    r.expect("stderr write failed")
}

pub(crate) struct Handle {
    join_handle: std::thread::JoinHandle<()>,
    sender: mpsc::Sender<Command>,
}

impl Handle {
    pub(crate) fn finish(self) {
        self.sender
            .send(Command::Finish)
            .expect("term out endpoint closed");
        self.join_handle.join().expect("term out thread panicked");
    }

    pub(crate) fn get_progress_print(&self) -> ProgressPrint {
        ProgressPrint {
            sender: self.sender.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ProgressPrint {
    sender: mpsc::Sender<Command>,
}

impl ProgressPrint {
    pub(crate) fn set_progress(&self, progress: String) {
        self.sender
            .send(Command::SetProgress(progress))
            .expect("term out endpoint closed");
    }

    pub(crate) fn print_raw_line(&self, line: Vec<u8>) {
        self.sender
            .send(Command::PrintRawLine(line))
            .expect("term out endpoint closed");
    }
}
