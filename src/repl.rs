use std::env;

use log::warn;
use rustyline::Editor;

use vmm::disasm::{disassemble, instruction_to_text};
use vmm::{Machine, Program, RuntimeConfig, Step, Tape, Word};

/// What the loop should do after a line has been evaluated
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Print(String),
    Nothing,
    Quit,
}

/// Interpreter state behind the shell, independent of the line editor
pub struct Session {
    program: Program,
    machine: Machine,
    input: Tape,
    output: Tape,
    config: RuntimeConfig,
    cmd_buf: Vec<String>,
}

impl Session {
    pub fn new(config: RuntimeConfig) -> Self {
        let program = Program::new(vec![99]);
        Session {
            machine: Machine::new(&program).with_label("shell").with_debug(config.debug),
            program,
            input: Tape::new(),
            output: Tape::new(),
            config,
            cmd_buf: vec![],
        }
    }

    fn parse_words(args: &str) -> Result<Vec<Word>, String> {
        args.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Word>().map_err(|e| format!("Invalid value {:?}: {}", s, e)))
            .collect()
    }

    fn load(&mut self, program: Program) -> String {
        self.machine = Machine::new(&program)
            .with_label("shell")
            .with_debug(self.config.debug);
        self.input.drain();
        self.output.drain();
        let reply = format!("loaded {} words", program.len());
        self.program = program;
        reply
    }

    fn run(&self, args: &str) -> Result<String, String> {
        let inputs = Self::parse_words(args)?;
        let mut machine = Machine::new(&self.program)
            .with_label("shell")
            .with_debug(self.config.debug);
        let mut input = Tape::from(inputs);
        let mut output = Tape::new();
        let result = machine.run(&mut input, &mut output);
        let printed: Vec<String> = output.drain().iter().map(Word::to_string).collect();
        match result {
            Ok(state) => Ok(format!("output: [{}]\nhalted at {}", printed.join(","), state.ip)),
            Err(e) => Err(format!("output: [{}]\nerror: {}", printed.join(","), e)),
        }
    }

    fn step(&mut self) -> Result<String, String> {
        if self.machine.is_halted() {
            return Err("machine halted; reload the program to start over".to_string());
        }
        let ip = usize::try_from(self.machine.ip()).map_err(|e| e.to_string())?;
        let (text, _) = instruction_to_text(self.machine.memory().as_slice(), ip);
        let step = self
            .machine
            .step(&mut self.input, &mut self.output)
            .map_err(|e| format!("{:>5}: {}\nerror: {}", ip, text, e))?;
        let mut reply = format!("{:>5}: {}", ip, text);
        for value in self.output.drain() {
            reply.push_str(&format!("\n-> {}", value));
        }
        if step == Step::Halted {
            reply.push_str("\nhalted");
        }
        Ok(reply)
    }

    fn mem(&self, args: &str) -> Result<String, String> {
        let bounds = Self::parse_words(args)?;
        let memory = self.machine.memory().as_slice();
        let from = bounds.first().copied().unwrap_or(0).max(0) as usize;
        let to = bounds
            .get(1)
            .map(|to| (*to).max(0) as usize)
            .unwrap_or(memory.len())
            .min(memory.len());
        if from >= to {
            return Ok(String::new());
        }
        let lines: Vec<String> = memory[from..to]
            .chunks(8)
            .enumerate()
            .map(|(row, words)| {
                let words: Vec<String> = words.iter().map(|w| format!("{:>6}", w)).collect();
                format!("{:>5}: {}", from + row * 8, words.join(" "))
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Evaluate one line of input
    pub fn eval(&mut self, line: &str) -> Reply {
        let line = line.trim();
        if line.is_empty() {
            return Reply::Nothing;
        }
        let (cmd, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let result = match cmd {
            ".quit" => return Reply::Quit,
            ".history" => Ok(self.cmd_buf.join("\n")),
            ".program" | ".prog" => Ok(disassemble(self.machine.memory().as_slice())),
            ".registers" | ".regs" => Ok(format!(
                "instruction pointer:{}\nrelative base:{}\nhalted:{}",
                self.machine.ip(),
                self.machine.relative_base(),
                self.machine.is_halted()
            )),
            ".run" => self.run(args),
            ".step" => self.step(),
            ".input" | ".in" => Self::parse_words(args).map(|words| {
                for word in &words {
                    self.input.push(*word);
                }
                format!("{} values queued", self.input.len())
            }),
            ".mem" => self.mem(args),
            _ if cmd.starts_with('.') => Err(format!("Unknown command {}", cmd)),
            _ => line
                .parse::<Program>()
                .map(|program| self.load(program))
                .map_err(|e| format!("Invalid input\n{}", e)),
        };
        self.cmd_buf.push(line.to_string());
        match result {
            Ok(text) if text.is_empty() => Reply::Nothing,
            Ok(text) | Err(text) => Reply::Print(text),
        }
    }
}

pub struct Repl {
    session: Session,
    rl: Editor<()>,
    loc: String,
}

impl Repl {
    pub fn new(config: RuntimeConfig) -> Self {
        let loc = env::var("HOME").unwrap_or_else(|_| HOME.to_string()) + "/.intcode.history.txt";
        let mut rl = Editor::<()>::new();
        if rl.load_history(&loc).is_err() {
            println!("No history");
        }
        Repl {
            session: Session::new(config),
            rl,
            loc,
        }
    }

    pub fn run(&mut self) {
        println!("intcode shell {}", env!("CARGO_PKG_VERSION"));
        loop {
            let buf = self.rl.readline(PROMPT).unwrap_or_else(|_| String::from(".quit"));
            if !buf.trim().is_empty() {
                self.rl.add_history_entry(buf.as_str());
            }
            match self.session.eval(&buf) {
                Reply::Print(text) => println!("{}", text),
                Reply::Nothing => {}
                Reply::Quit => break,
            }
        }
        println!("See ya!");
        if let Err(e) = self.rl.save_history(&self.loc) {
            warn!("could not save history to {}: {}", self.loc, e);
        }
    }
}

#[cfg(windows)]
const HOME: &str = "%APPDATA%";
#[cfg(windows)]
const PROMPT: &str = ">>> ";
#[cfg(not(windows))]
const HOME: &str = "~";
#[cfg(not(windows))]
const PROMPT: &str = "\x1b[38;5;85m>>> \x1b[0m";
