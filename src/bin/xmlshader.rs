use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use xmlshader::preprocess::wrapped::NodeView;
use xmlshader::shader::{ProgramFactory, ShaderProgram, ShaderTags};

#[derive(Parser, Debug)]
#[command(name = "xmlshader", version)]
struct Cli {
    /// Compiler options JSON.
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    /// Shader tag options JSON.
    #[arg(long, global = true)]
    tags: Option<PathBuf>,

    /// Report technique load failures and deprecated syntax.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the parsed conditions, the condition tree and the variants.
    Dump(DumpArgs),
    /// Evaluate a render state and print the selected variant and ticket.
    Ticket(TicketArgs),
    /// List technique priorities, best first.
    Priorities(InputArgs),
}

#[derive(Parser, Debug)]
struct InputArgs {
    /// Input shader XML.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct DumpArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Include the value sets of every tree node.
    #[arg(long)]
    values: bool,
}

#[derive(Parser, Debug)]
struct TicketArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Shader variable as `NAME=TYPE:VALUE`, e.g. `light count=int:2`.
    #[arg(long = "var")]
    vars: Vec<String>,

    /// Render buffer the mesh provides, e.g. `texture coordinate 0`.
    #[arg(long = "buffer")]
    buffers: Vec<String>,
}

/// Stand-in program: accepts any description and binds nothing.
struct NullProgram;

impl ShaderProgram for NullProgram {
    fn load(&mut self, _resolver: Option<&dyn ShaderProgram>, _node: &NodeView<'_>) -> bool {
        true
    }

    fn compile(&mut self) -> bool {
        true
    }

    fn activate(&mut self) {}

    fn deactivate(&mut self) {}

    fn setup_state(
        &mut self,
        _modes: &xmlshader::RenderMeshModes,
        _stack: &xmlshader::ShaderVarStack,
    ) {
    }

    fn reset_state(&mut self) {}
}

struct NullPrograms;

impl ProgramFactory for NullPrograms {
    fn create(&self, _plugin: &str, _program_type: &str) -> Option<Box<dyn ShaderProgram>> {
        Some(Box::new(NullProgram))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let compiler = make_compiler(&cli)?;
    let result = match &cli.cmd {
        Command::Dump(args) => cmd_dump(&compiler, args),
        Command::Ticket(args) => cmd_ticket(&compiler, args),
        Command::Priorities(args) => cmd_priorities(&compiler, args),
    };
    for d in compiler.diagnostics().take() {
        eprintln!("{:?}: {}", d.severity, d.message);
    }
    result
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse JSON '{}'", path.display()))
}

fn make_compiler(cli: &Cli) -> anyhow::Result<xmlshader::ShaderCompiler> {
    let mut options: xmlshader::CompilerOptions = match &cli.options {
        Some(p) => read_json(p)?,
        None => xmlshader::CompilerOptions::default(),
    };
    options.verbose |= cli.verbose;
    if let Command::Dump(args) = &cli.cmd {
        options.dump_conditions = true;
        options.dump_values |= args.values;
    }
    let tags: ShaderTags = match &cli.tags {
        Some(p) => read_json(p)?,
        None => ShaderTags::default(),
    };

    let in_path = match &cli.cmd {
        Command::Dump(a) => &a.input.in_path,
        Command::Ticket(a) => &a.input.in_path,
        Command::Priorities(a) => &a.in_path,
    };
    let base = in_path.parent().unwrap_or_else(|| Path::new("."));
    let env = xmlshader::CompilerEnv::new(xmlshader::DirFiles::new(base), NullPrograms)
        .with_options(options)
        .with_tags(tags);
    Ok(xmlshader::ShaderCompiler::new(env))
}

fn read_shader(path: &Path) -> anyhow::Result<xmlshader::SourceNode> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read shader '{}'", path.display()))?;
    xmlshader::parse_document(&text).with_context(|| format!("parse shader '{}'", path.display()))
}

fn compile(
    compiler: &xmlshader::ShaderCompiler,
    input: &InputArgs,
) -> anyhow::Result<xmlshader::XmlShader> {
    let doc = read_shader(&input.in_path)?;
    compiler
        .compile(&doc)
        .with_context(|| format!("compile shader '{}'", input.in_path.display()))
}

fn cmd_dump(compiler: &xmlshader::ShaderCompiler, args: &DumpArgs) -> anyhow::Result<()> {
    let shader = compile(compiler, &args.input)?;
    println!("{}", shader.condition_dump());
    println!("{}", shader.resolver().dump_condition_tree());
    println!();
    println!("shader '{}': {}", shader.name(), shader.dump_stats());

    print_variants("technique choice", shader.resolver());
    for t in 0..shader.technique_count() {
        if let Some(r) = shader.technique_resolver(t) {
            print_variants(&format!("technique {t}"), r);
        }
    }
    Ok(())
}

fn print_variants(label: &str, resolver: &xmlshader::ConditionResolver) {
    let eval = resolver.evaluator();
    for v in 0..resolver.variant_count() {
        let conds: Vec<String> = resolver
            .variant_conditions(v)
            .iter()
            .map(|(c, value)| format!("({}) = {value}", eval.condition_description(*c)))
            .collect();
        println!("{label} variant {v}: {}", conds.join(", "));
    }
}

fn parse_var(arg: &str) -> anyhow::Result<(String, xmlshader::ShaderVariable)> {
    let (name, rest) = arg
        .split_once('=')
        .with_context(|| format!("variable '{arg}' is not NAME=TYPE:VALUE"))?;
    let (kind, value) = rest
        .split_once(':')
        .with_context(|| format!("variable '{arg}' is not NAME=TYPE:VALUE"))?;
    let var = xmlshader::ShaderVariable::parse(kind.trim(), value)
        .with_context(|| format!("invalid {kind} value '{value}' for '{name}'"))?;
    Ok((name.trim().to_owned(), var))
}

fn cmd_ticket(compiler: &xmlshader::ShaderCompiler, args: &TicketArgs) -> anyhow::Result<()> {
    let mut shader = compile(compiler, &args.input)?;

    let mut stack = xmlshader::ShaderVarStack::new();
    for arg in &args.vars {
        let (name, value) = parse_var(arg)?;
        stack.set(name, value);
    }
    let mut buffers = Vec::new();
    for b in &args.buffers {
        buffers.push(
            xmlshader::RenderBufferName::from_descr(b)
                .with_context(|| format!("unknown render buffer '{b}'"))?,
        );
    }
    let modes = xmlshader::RenderMeshModes::with_buffers(buffers);

    let variant = shader.resolver().get_variant(&modes, &stack);
    println!("technique variant: {variant}");
    match shader.get_ticket(&modes, &stack) {
        Some(ticket) => {
            println!("ticket: {ticket} ({:?})", shader.decode_ticket(ticket));
            println!("passes: {}", shader.num_passes(ticket));
            let used: Vec<String> = shader.used_shader_vars(ticket).into_iter().collect();
            println!("used variables: {}", used.join(", "));
        }
        None => println!("ticket: none"),
    }
    Ok(())
}

fn cmd_priorities(compiler: &xmlshader::ShaderCompiler, args: &InputArgs) -> anyhow::Result<()> {
    let doc = read_shader(&args.in_path)?;
    for p in compiler.priorities(&doc)? {
        println!("{p}");
    }
    Ok(())
}
