use limn::builtins::create_global_env;
use limn::{Environment, ParseConfig, Value, evaluate_with_config};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

const HELP: &str = "\
Commands:
  :help          this text
  :env           list visible bindings
  :quit, :exit   leave (Ctrl+C and Ctrl+D work too)

Syntax:
  + 1 * 3 2              calls absorb as many arguments as the method declares
  (+ 1 (* 3 2))          parentheses delimit one expression explicitly
  .. --step 4 1 20       optional parameters are passed as --name value
  '(+ 1 2)               a quote defers evaluation
  # ...                  comment to end of line

Methods:
  arithmetic   + - * / % min max sum mul
  comparison   = != < <= > >=
  logic        ! && || if
  collections  list first size filter map concat ..
  system       def set scope

Try:
  set '$xs (list 1 2 3 4 5)
  filter $xs '(> $it 2)
  def 'sq '$x '(* $x $x)
  map (.. 1 5) '(sq $it)
";

/// What to do after a line has been handled
enum Flow {
    Continue,
    Quit,
}

fn main() -> Result<(), ReadlineError> {
    let mut editor = DefaultEditor::new()?;
    let mut env = create_global_env();
    let config = ParseConfig {
        handle_comments: true,
    };

    println!("limn {}: enter an expression, or :help", env!("CARGO_PKG_VERSION"));

    loop {
        let line = match editor.readline("limn> ") {
            Ok(line) => line,
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => return Err(err),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        if let Flow::Quit = handle_line(&mut env, line, config) {
            break;
        }
    }
    Ok(())
}

fn handle_line(env: &mut Environment, line: &str, config: ParseConfig) -> Flow {
    match line {
        ":help" => print!("{HELP}"),
        ":env" => show_bindings(env),
        ":quit" | ":exit" => return Flow::Quit,
        command if command.starts_with(':') => {
            println!("unknown command {command}, try :help");
        }
        source => match evaluate_with_config(env, source, config) {
            Ok(value) => println!("{value}"),
            Err(err) => println!("{err}"),
        },
    }
    Flow::Continue
}

fn show_bindings(env: &Environment) {
    let (natives, values): (Vec<_>, Vec<_>) = env
        .bindings()
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::Method(m) if m.is_native()));

    if !natives.is_empty() {
        let names: Vec<_> = natives.into_iter().map(|(name, _)| name).collect();
        println!("native methods ({}):", names.len());
        for row in names.chunks(8) {
            println!("  {}", row.join(" "));
        }
    }

    if values.is_empty() {
        println!("no user bindings");
    } else {
        println!("user bindings ({}):", values.len());
        for (name, value) in values {
            println!("  {name:<12} {value}");
        }
    }
}
