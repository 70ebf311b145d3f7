use std::io::Write;

use chrono::{Local, NaiveDateTime};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{debug, info};

use crate::ark::ArkClientTrait;
use crate::error::CommandError;
use crate::flag::{LabelSelectorFlag, StringArray, StringMap};
use crate::output::OutputOptions;
use crate::types::{ObjectMeta, Restore, RestoreSpec};

/// Suffix appended to the backup name; fixed width and lexically sortable.
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const BACKUP_ARG: &str = "BACKUP";
const RESTORE_VOLUMES_ARG: &str = "restore-volumes";
const LABELS_ARG: &str = "labels";
const NAMESPACES_ARG: &str = "namespaces";
const NAMESPACE_MAPPINGS_ARG: &str = "namespace-mappings";
const SELECTOR_ARG: &str = "selector";

/// Where an invocation is in the validate -> complete -> run sequence.
/// Validation never changes the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unvalidated,
    Completed,
    Executed,
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub backup_name: String,
    pub restore_volumes: bool,
    pub labels: StringMap,
    pub namespaces: StringArray,
    pub namespace_mappings: StringMap,
    pub selector: LabelSelectorFlag,
    pub output: OutputOptions,
    phase: Phase,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateOptions {
    pub fn new() -> Self {
        Self {
            backup_name: String::new(),
            restore_volumes: false,
            labels: StringMap::new(),
            namespaces: StringArray::new(),
            namespace_mappings: StringMap::new()
                .with_entry_delimiter(",")
                .with_key_value_delimiter(":"),
            selector: LabelSelectorFlag::new(),
            output: OutputOptions::default(),
            phase: Phase::Unvalidated,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The `create` subcommand with every flag bound.
    pub fn command() -> Command {
        let cmd = Command::new("create")
            .about("Create a restore")
            .args_override_self(true)
            .arg(
                Arg::new(BACKUP_ARG)
                    .help("Name of the backup to restore from")
                    .num_args(1..)
                    .action(ArgAction::Append),
            );
        let cmd = Self::new().bind_flags(cmd);
        OutputOptions::bind_flags(cmd)
    }

    fn bind_flags(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new(RESTORE_VOLUMES_ARG)
                .long("restore-volumes")
                .help("Whether to restore volumes from snapshots")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(LABELS_ARG)
                .long("labels")
                .value_name("KEY=VALUE,...")
                .help("Labels to apply to the restore")
                .value_parser(self.labels.value_parser()),
        )
        .arg(
            Arg::new(NAMESPACES_ARG)
                .long("namespaces")
                .value_name("NS,...")
                .help("Comma-separated list of namespaces to restore")
                .value_parser(self.namespaces.value_parser()),
        )
        .arg(
            Arg::new(NAMESPACE_MAPPINGS_ARG)
                .long("namespace-mappings")
                .value_name("SRC:DST,...")
                .help(
                    "Namespace mappings from name in the backup to desired restored name \
                     in the form src1:dst1,src2:dst2,...",
                )
                .value_parser(self.namespace_mappings.value_parser()),
        )
        .arg(
            Arg::new(SELECTOR_ARG)
                .short('l')
                .long("selector")
                .value_name("SELECTOR")
                .help("Only restore resources matching this label selector")
                .value_parser(LabelSelectorFlag::parse),
        )
    }

    /// Reads flag values out of parsed matches. The positional arguments
    /// are left to [`positional_args`] so that their count is checked by
    /// `validate`.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let mut options = Self::new();
        options.restore_volumes = matches.get_flag(RESTORE_VOLUMES_ARG);
        if let Some(labels) = matches.get_one::<StringMap>(LABELS_ARG) {
            options.labels = labels.clone();
        }
        if let Some(namespaces) = matches.get_one::<StringArray>(NAMESPACES_ARG) {
            options.namespaces = namespaces.clone();
        }
        if let Some(mappings) = matches.get_one::<StringMap>(NAMESPACE_MAPPINGS_ARG) {
            options.namespace_mappings = mappings.clone();
        }
        if let Some(selector) = matches.get_one::<LabelSelectorFlag>(SELECTOR_ARG) {
            options.selector = selector.clone();
        }
        options.output = OutputOptions::from_matches(matches);
        options
    }

    /// Checks argument shape only. Never mutates.
    pub fn validate(&self, args: &[String]) -> Result<(), CommandError> {
        if args.len() != 1 {
            return Err(CommandError::ArgumentCount { given: args.len() });
        }
        self.output.validate()
    }

    pub fn complete(&mut self, args: &[String]) -> Result<(), CommandError> {
        self.expect_phase(Phase::Unvalidated)?;
        let Some(backup_name) = args.first() else {
            return Err(CommandError::ArgumentCount { given: 0 });
        };
        self.backup_name = backup_name.clone();
        self.phase = Phase::Completed;
        Ok(())
    }

    /// Validate followed by complete. Nothing outside the options is read.
    pub fn prepare(&mut self, args: &[String]) -> Result<(), CommandError> {
        self.validate(args)?;
        self.complete(args)
    }

    /// Builds the restore and either prints it (when an output format is
    /// set) or submits it. Runs at most once per options value.
    pub async fn run<C, W>(&mut self, ctx: &mut RunContext<'_, C, W>) -> Result<(), CommandError>
    where
        C: ArkClientTrait + ?Sized,
        W: Write,
    {
        self.expect_phase(Phase::Completed)?;
        self.phase = Phase::Executed;

        let restore = build_restore(self, &ctx.namespace, (ctx.clock)());
        debug!(
            name = %restore.metadata.name,
            namespace = %restore.metadata.namespace,
            backup = %restore.spec.backup_name,
            "built restore request"
        );

        if self.output.print_with_format(&mut ctx.out, &restore)? {
            return Ok(());
        }

        info!(name = %restore.metadata.name, "submitting restore");
        let created = ctx
            .client
            .create_restore(&restore.metadata.namespace, &restore)
            .await
            .map_err(CommandError::Submission)?;

        writeln!(
            ctx.out,
            "Restore {:?} created successfully.",
            created.metadata.name
        )?;
        Ok(())
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), CommandError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(CommandError::OutOfOrder {
                expected,
                actual: self.phase,
            })
        }
    }
}

/// Everything `run` needs from outside the option set.
pub struct RunContext<'a, C: ?Sized, W> {
    pub client: &'a C,
    /// Namespace the restore object is created in.
    pub namespace: String,
    pub clock: fn() -> NaiveDateTime,
    pub out: W,
}

impl<'a, C: ?Sized, W> RunContext<'a, C, W> {
    pub fn new(client: &'a C, namespace: impl Into<String>, out: W) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            clock: local_now,
            out,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }
}

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn positional_args(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>(BACKUP_ARG)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// `<backup>-YYYYMMDDHHMMSS`. Two restores of the same backup started within
/// the same second get the same name; the server rejects the second one.
pub fn restore_name(backup_name: &str, now: NaiveDateTime) -> String {
    format!("{}-{}", backup_name, now.format(NAME_TIMESTAMP_FORMAT))
}

pub fn build_restore(options: &CreateOptions, namespace: &str, now: NaiveDateTime) -> Restore {
    Restore::new(
        ObjectMeta {
            namespace: namespace.to_string(),
            name: restore_name(&options.backup_name, now),
            labels: options.labels.data().clone(),
            ..Default::default()
        },
        RestoreSpec {
            backup_name: options.backup_name.clone(),
            namespaces: options.namespaces.values().to_vec(),
            namespace_mapping: options.namespace_mappings.data().clone(),
            label_selector: options.selector.selector().cloned(),
            restore_pvs: options.restore_volumes,
        },
    )
}

/// Drives one invocation through validate, complete and run, stopping at
/// the first error.
pub async fn execute<C, W>(
    mut options: CreateOptions,
    args: &[String],
    ctx: &mut RunContext<'_, C, W>,
) -> Result<(), CommandError>
where
    C: ArkClientTrait + ?Sized,
    W: Write,
{
    options.prepare(args)?;
    options.run(ctx).await
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use clap::error::ErrorKind;

    use super::*;
    use crate::ark::MockArkClientTrait;
    use crate::flag::FlagError;
    use crate::types::{LabelSelectorOperator, RestorePhase, DEFAULT_NAMESPACE};

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(4, 5, 9)
            .unwrap()
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn parse(argv: &[&str]) -> (CreateOptions, Vec<String>) {
        let matches = CreateOptions::command()
            .try_get_matches_from(std::iter::once("create").chain(argv.iter().copied()))
            .unwrap();
        (CreateOptions::from_matches(&matches), positional_args(&matches))
    }

    fn completed(argv: &[&str]) -> CreateOptions {
        let (mut options, args) = parse(argv);
        options.validate(&args).unwrap();
        options.complete(&args).unwrap();
        options
    }

    #[test]
    fn verify_cmd_structure() {
        CreateOptions::command().debug_assert();
    }

    #[test]
    fn test_flags_bind_to_options() {
        let (options, args) = parse(&[
            "daily",
            "--restore-volumes",
            "--labels",
            "team=infra,env=prod",
            "--namespaces",
            "web,db",
            "--namespace-mappings",
            "web:web-restored,db:db-restored",
            "-l",
            "app in (api,web)",
        ]);

        assert_eq!(args, ["daily"]);
        assert!(options.restore_volumes);
        assert_eq!(options.labels.data()["env"], "prod");
        assert_eq!(options.namespaces.values(), ["web", "db"]);
        assert_eq!(options.namespace_mappings.data()["db"], "db-restored");
        let selector = options.selector.selector().unwrap();
        assert_eq!(
            selector.match_expressions[0].operator,
            LabelSelectorOperator::In
        );
        assert!(options.output.output.is_none());
    }

    #[test]
    fn test_defaults_when_flags_absent() {
        let (options, _) = parse(&["daily"]);
        assert!(!options.restore_volumes);
        assert!(options.labels.is_empty());
        assert!(options.namespaces.is_empty());
        assert!(options.namespace_mappings.is_empty());
        assert!(options.selector.selector().is_none());
        assert_eq!(options.phase(), Phase::Unvalidated);
    }

    #[test]
    fn test_repeated_flag_last_wins() {
        let (options, _) = parse(&["daily", "--namespaces", "a,b", "--namespaces", "c"]);
        assert_eq!(options.namespaces.values(), ["c"]);
    }

    #[test]
    fn test_malformed_flag_values_fail_binding() {
        for argv in [
            ["daily", "--labels", "novalue"],
            ["daily", "--namespace-mappings", "src=dst"],
            ["daily", "--selector", "app in (a"],
        ] {
            let err = CreateOptions::command()
                .try_get_matches_from(std::iter::once("create").chain(argv))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation, "argv {argv:?}");
        }
    }

    #[test]
    fn test_malformed_entry_message_reaches_user() {
        let err = CreateOptions::command()
            .try_get_matches_from(["create", "daily", "--labels", "a=1,b"])
            .unwrap_err();
        let expected = FlagError::MalformedEntry {
            entry: "b".to_string(),
            delimiter: "=".to_string(),
        };
        assert!(err.to_string().contains(&expected.to_string()));
    }

    #[test]
    fn test_validate_argument_count() {
        let options = CreateOptions::new();
        for given in [args(&[]), args(&["a", "b"]), args(&["a", "b", "c"])] {
            let err = options.validate(&given).unwrap_err();
            assert!(matches!(err, CommandError::ArgumentCount { given: n } if n == given.len()));
            assert_eq!(
                err.to_string(),
                "you must specify only one argument, the backup's name"
            );
        }
        assert!(options.validate(&args(&["daily"])).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_output_format() {
        let (options, args) = parse(&["daily", "-o", "wide"]);
        let err = options.validate(&args).unwrap_err();
        assert!(matches!(err, CommandError::UnsupportedOutputFormat { .. }));
    }

    #[test]
    fn test_validate_does_not_mutate() {
        let (options, args) = parse(&["daily", "--labels", "a=1"]);
        let before = options.clone();
        options.validate(&args).unwrap();
        options.validate(&args).unwrap();
        assert_eq!(options.phase(), Phase::Unvalidated);
        assert_eq!(options.backup_name, before.backup_name);
        assert!(options.backup_name.is_empty());
    }

    #[test]
    fn test_complete_binds_backup_name() {
        let options = completed(&["daily"]);
        assert_eq!(options.backup_name, "daily");
        assert_eq!(options.phase(), Phase::Completed);
    }

    #[test]
    fn test_prepare_stops_at_validation() {
        let (mut options, args) = parse(&["a", "b", "-o", "wide"]);
        let err = options.prepare(&args).unwrap_err();
        assert!(matches!(err, CommandError::ArgumentCount { given: 2 }));
        assert_eq!(options.phase(), Phase::Unvalidated);
        assert!(options.backup_name.is_empty());

        let (mut options, args) = parse(&["daily"]);
        options.prepare(&args).unwrap();
        assert_eq!(options.backup_name, "daily");
        assert_eq!(options.phase(), Phase::Completed);
    }

    #[test]
    fn test_restore_name_format() {
        let name = restore_name("daily", fixed_clock());
        assert_eq!(name, "daily-20240307040509");
        let suffix = name.strip_prefix("daily-").unwrap();
        assert_eq!(suffix.len(), 14);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_build_restore_copies_options() {
        let options = completed(&[
            "daily",
            "--labels",
            "team=infra",
            "--namespaces",
            "web",
            "--namespace-mappings",
            "web:staging",
            "--selector",
            "app=web",
            "--restore-volumes",
        ]);
        let restore = build_restore(&options, "ark-system", fixed_clock());

        assert_eq!(restore.metadata.namespace, "ark-system");
        assert_eq!(restore.metadata.name, "daily-20240307040509");
        assert_eq!(restore.metadata.labels, *options.labels.data());
        assert_eq!(restore.spec.backup_name, "daily");
        assert_eq!(restore.spec.namespaces, ["web"]);
        assert_eq!(restore.spec.namespace_mapping["web"], "staging");
        assert_eq!(
            restore.spec.label_selector.as_ref(),
            options.selector.selector()
        );
        assert!(restore.spec.restore_pvs);
        assert_eq!(restore.status.phase, None);
    }

    #[test]
    fn test_build_restore_passes_empty_values_through() {
        let options = completed(&["daily", "--namespaces", "", "--selector", ""]);
        let restore = build_restore(&options, DEFAULT_NAMESPACE, fixed_clock());
        assert!(restore.spec.namespaces.is_empty());
        assert!(restore.spec.namespace_mapping.is_empty());
        assert!(restore.metadata.labels.is_empty());
        assert!(restore.spec.label_selector.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_output_format_short_circuits_submission() {
        let mut client = MockArkClientTrait::new();
        client.expect_create_restore().never();

        let (options, args) = parse(&["daily", "-o", "json", "--labels", "team=infra"]);
        let mut ctx = RunContext::new(&client, DEFAULT_NAMESPACE, Vec::<u8>::new())
            .with_clock(fixed_clock);
        execute(options, &args, &mut ctx).await.unwrap();

        let printed: Restore = serde_json::from_slice(&ctx.out).unwrap();
        assert_eq!(printed.metadata.name, "daily-20240307040509");
        assert_eq!(printed.metadata.namespace, DEFAULT_NAMESPACE);
        assert_eq!(printed.metadata.labels["team"], "infra");
    }

    #[tokio::test]
    async fn test_submit_reports_server_name() {
        let mut client = MockArkClientTrait::new();
        client
            .expect_create_restore()
            .times(1)
            .returning(|namespace, restore| {
                assert_eq!(namespace, DEFAULT_NAMESPACE);
                assert_eq!(restore.metadata.name, "daily-20240307040509");
                assert_eq!(restore.spec.backup_name, "daily");
                let mut stored = restore.clone();
                stored.metadata.name = "daily-20240307040509-x".to_string();
                stored.metadata.uid = Some("6f1c".to_string());
                stored.status.phase = Some(RestorePhase::New);
                Ok(stored)
            });

        let (options, args) = parse(&["daily"]);
        let mut ctx = RunContext::new(&client, DEFAULT_NAMESPACE, Vec::<u8>::new())
            .with_clock(fixed_clock);
        execute(options, &args, &mut ctx).await.unwrap();

        assert_eq!(
            String::from_utf8(ctx.out).unwrap(),
            "Restore \"daily-20240307040509-x\" created successfully.\n"
        );
    }

    #[tokio::test]
    async fn test_submission_error_is_unaltered() {
        const EXISTS: &str = "restores.ark.heptio.com \"daily\" already exists";
        let mut client = MockArkClientTrait::new();
        client
            .expect_create_restore()
            .times(1)
            .returning(|_, _| Err(anyhow!(EXISTS)));

        let (options, args) = parse(&["daily"]);
        let mut ctx = RunContext::new(&client, DEFAULT_NAMESPACE, Vec::<u8>::new())
            .with_clock(fixed_clock);
        let err = execute(options, &args, &mut ctx).await.unwrap_err();

        assert!(matches!(err, CommandError::Submission(_)));
        assert_eq!(err.to_string(), EXISTS);
        assert!(ctx.out.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_stops_before_run() {
        let mut client = MockArkClientTrait::new();
        client.expect_create_restore().never();

        let (options, args) = parse(&["daily", "weekly"]);
        let mut ctx = RunContext::new(&client, DEFAULT_NAMESPACE, Vec::<u8>::new());
        let err = execute(options, &args, &mut ctx).await.unwrap_err();

        assert!(matches!(err, CommandError::ArgumentCount { given: 2 }));
        assert!(ctx.out.is_empty());
    }

    #[tokio::test]
    async fn test_run_requires_complete_and_runs_once() {
        let mut client = MockArkClientTrait::new();
        client
            .expect_create_restore()
            .times(1)
            .returning(|_, restore| Ok(restore.clone()));
        let mut ctx = RunContext::new(&client, DEFAULT_NAMESPACE, Vec::<u8>::new())
            .with_clock(fixed_clock);

        let mut options = CreateOptions::new();
        let err = options.run(&mut ctx).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::OutOfOrder {
                expected: Phase::Completed,
                actual: Phase::Unvalidated
            }
        ));

        options.complete(&args(&["daily"])).unwrap();
        options.run(&mut ctx).await.unwrap();
        assert_eq!(options.phase(), Phase::Executed);

        let err = options.run(&mut ctx).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::OutOfOrder {
                actual: Phase::Executed,
                ..
            }
        ));
    }
}
