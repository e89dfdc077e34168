use std::process;

use anyhow::Result;
use rsptrace::{interrupt, Backend, Event, Pid, RspBackend, Target};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
struct Opt {
    /// Stub to trace through: `|gdbserver --multi stdio`, `host:port[#non-stop]` or a path
    #[structopt(short, long, default_value = "|gdbserver --multi stdio")]
    target: Target,

    /// Attach to a running process instead of starting one
    #[structopt(short, long)]
    pid: Option<i32>,

    #[structopt(short, long)]
    quiet: bool,

    argv: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();

    if let Err(err) = run(opt) {
        eprintln!("error: {:#}", err);
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    interrupt::install_handlers()?;

    let mut backend = RspBackend::new(opt.target);
    backend.init()?;
    backend.post_init()?;

    match opt.pid {
        Some(pid) => backend.attach_thread(Pid::from_raw(pid))?,
        None => {
            if opt.argv.is_empty() {
                anyhow::bail!("expected a command or `--pid`");
            }

            let tid = backend.startup_child(&opt.argv)?;
            backend.restart_process(tid, None)?;
        },
    }

    let traced = trace(&mut backend, opt.quiet);
    backend.cleanup()?;

    traced
}

fn trace(backend: &mut RspBackend, quiet: bool) -> Result<()> {
    loop {
        let event = match backend.next_event() {
            Ok(event) => event,
            Err(err) if !err.is_fatal() => {
                eprintln!("warning: {}", err);
                continue;
            },
            Err(err) => return Err(err.into()),
        };

        if !quiet {
            println!("{:?}", event);
        }

        let (pid, signal) = match event {
            Event::Break => return Ok(()),
            Event::Exited { .. } | Event::Signalled { .. } => continue,
            Event::SignalDelivery { pid, signal } => (pid, Some(signal)),
            Event::GroupStop { pid, signal } => {
                backend.handle_group_stop(pid, signal)?;
                (pid, None)
            },
            Event::SyscallEnter { pid, .. } => {
                if !quiet {
                    let regs = backend.registers(pid)?;
                    println!("  pc = {:x}", regs.instruction_pointer());
                }

                (pid, None)
            },
            Event::SyscallExit { pid, .. } | Event::Restart { pid } => (pid, None),
        };

        backend.restart_process(pid, signal)?;
    }
}
