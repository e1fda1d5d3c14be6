//! Playing whole episodes against a policy.
//!
//! A [`GameSession`] plays `batch_size` episodes with one policy instance and averages the
//! per-player scores. Every episode runs in a fresh engine:
//!
//! 1. acquire a [`SlotLease`](crate::slot::SlotLease) (blocks while every slot is taken)
//! 2. launch the engine for the leased slot and the episode seed
//! 3. read the first record, then answer each observation with the policy's action until
//!    a terminal record arrives
//! 4. kill the engine, then release the slot
//!
//! Episode `i` of a batch is seeded with `seed + i`, so evaluating the same policy with
//! the same seed replays the same episodes.
//!
//! # Failures
//!
//! An engine that hangs past the episode deadline, or exits before its terminal record,
//! is killed and the episode is retried in a new engine, up to the configured attempt
//! budget. Anything else (the engine cannot be started, the policy rejects an
//! observation, the terminal record has no score) aborts the session.

use std::{path::Path, time::Instant};

use log::{debug, warn};

use crate::{
    game::{GameSpec, InvocationContext, TemplateError},
    policy::{Policy, PolicyError},
    process::{EngineProcess, ProcessError},
    protocol::{self, LineDecoder, Record},
    slot::{SlotAllocator, SlotError},
};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum SessionError {
    #[display("{_0}")]
    #[from]
    Template(TemplateError),
    #[display("{_0}")]
    #[from]
    Process(ProcessError),
    #[display("{_0}")]
    #[from]
    Policy(PolicyError),
    #[display("{_0}")]
    #[from]
    Slot(SlotError),
    #[display("engine ended the episode without reporting a score")]
    MissingScore,
    #[display("episode reported {found} player score(s), previous episodes reported {expected}")]
    ScoreShape { expected: usize, found: usize },
    #[display("batch size must be at least 1")]
    EmptyBatch,
    #[display("episode failed {attempts} time(s), giving up: {source}")]
    AttemptsExhausted {
        attempts: usize,
        source: Box<SessionError>,
    },
}

impl SessionError {
    /// Returns `true` if retrying the episode in a new engine may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Process(e) if e.is_transient())
    }
}

/// One running episode of a game.
pub trait Game {
    /// Returns the first record of the episode.
    fn init_session(&mut self) -> Result<Record, SessionError>;
    /// Sends an action and returns the next record.
    fn step(&mut self, action: &[f64]) -> Result<Record, SessionError>;
    /// Tears the episode down. Called exactly once, whether or not the episode finished.
    fn finalize(&mut self);
}

/// Starts one episode bound to a slot.
pub trait GameLauncher {
    type Game: Game;

    fn launch(&self, slot: usize, seed: u64) -> Result<Self::Game, SessionError>;
}

/// An episode played by an external engine process.
#[derive(Debug)]
pub struct ProcessGame {
    process: EngineProcess,
    decoder: LineDecoder,
    deadline: Instant,
}

impl Game for ProcessGame {
    fn init_session(&mut self) -> Result<Record, SessionError> {
        Ok(self.process.read_record(&self.decoder, self.deadline)?)
    }

    fn step(&mut self, action: &[f64]) -> Result<Record, SessionError> {
        self.process.write_line(&protocol::encode_action(action))?;
        Ok(self.process.read_record(&self.decoder, self.deadline)?)
    }

    fn finalize(&mut self) {
        self.process.kill();
    }
}

/// Launches engine processes from a [`GameSpec`].
#[derive(Debug, Clone)]
pub struct ProcessLauncher<'a> {
    spec: &'a GameSpec,
    decoder: LineDecoder,
    model_path: Option<&'a Path>,
}

impl<'a> ProcessLauncher<'a> {
    #[must_use]
    pub fn new(spec: &'a GameSpec) -> Self {
        Self {
            spec,
            decoder: spec.decoder(),
            model_path: None,
        }
    }

    /// Sets the model file substituted for `{model}`.
    #[must_use]
    pub fn with_model_path(mut self, path: &'a Path) -> Self {
        self.model_path = Some(path);
        self
    }
}

impl GameLauncher for ProcessLauncher<'_> {
    type Game = ProcessGame;

    fn launch(&self, slot: usize, seed: u64) -> Result<ProcessGame, SessionError> {
        let ctx = InvocationContext {
            slot,
            port: self.spec.port(slot)?,
            seed,
            model_path: self.model_path,
        };
        let command = self.spec.command.resolve(&ctx)?;
        let deadline = Instant::now() + self.spec.episode_timeout;
        let process = EngineProcess::spawn(&command)?;
        Ok(ProcessGame {
            process,
            decoder: self.decoder.clone(),
            deadline,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Episodes per [`GameSession::play`] call.
    pub batch_size: usize,
    /// Attempts per episode, counting the first one.
    pub max_attempts: usize,
}

impl SessionOptions {
    #[must_use]
    pub fn for_game(spec: &GameSpec, batch_size: usize) -> Self {
        Self {
            batch_size,
            max_attempts: spec.max_episode_attempts,
        }
    }
}

/// Result of [`GameSession::play`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Per-player scores averaged over the batch, agent first.
    pub scores: Vec<f64>,
    /// Per-player scores of each episode, in play order.
    pub episode_scores: Vec<Vec<f64>>,
    /// Number of episodes restarted after an engine failure.
    pub retries: usize,
}

/// Plays batches of episodes against a policy.
#[derive(Debug)]
pub struct GameSession<'a, L> {
    launcher: L,
    slots: &'a SlotAllocator,
    options: SessionOptions,
}

impl<'a, L> GameSession<'a, L>
where
    L: GameLauncher,
{
    pub fn new(launcher: L, slots: &'a SlotAllocator, options: SessionOptions) -> Self {
        Self {
            launcher,
            slots,
            options,
        }
    }

    /// Plays `batch_size` episodes seeded `seed, seed + 1, ...` with the same policy.
    pub fn play<P>(&self, policy: &mut P, seed: u64) -> Result<SessionReport, SessionError>
    where
        P: Policy + ?Sized,
    {
        if self.options.batch_size == 0 {
            return Err(SessionError::EmptyBatch);
        }

        let mut episode_scores: Vec<Vec<f64>> = Vec::with_capacity(self.options.batch_size);
        let mut retries = 0;
        for episode in 0..self.options.batch_size {
            let episode_seed = seed.wrapping_add(episode as u64);
            let scores = self.play_with_retries(policy, episode_seed, &mut retries)?;
            if let Some(first) = episode_scores.first()
                && first.len() != scores.len()
            {
                return Err(SessionError::ScoreShape {
                    expected: first.len(),
                    found: scores.len(),
                });
            }
            episode_scores.push(scores);
        }

        Ok(SessionReport {
            scores: mean_scores(&episode_scores),
            episode_scores,
            retries,
        })
    }

    fn play_with_retries<P>(
        &self,
        policy: &mut P,
        seed: u64,
        retries: &mut usize,
    ) -> Result<Vec<f64>, SessionError>
    where
        P: Policy + ?Sized,
    {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.play_episode(policy, seed) {
                Ok(scores) => return Ok(scores),
                Err(e) if e.is_retryable() => {
                    if attempt >= max_attempts {
                        return Err(SessionError::AttemptsExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    warn!("episode with seed {seed} failed (attempt {attempt}/{max_attempts}): {e}; retrying");
                    attempt += 1;
                    *retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn play_episode<P>(&self, policy: &mut P, seed: u64) -> Result<Vec<f64>, SessionError>
    where
        P: Policy + ?Sized,
    {
        let lease = self.slots.acquire();
        let result = self
            .launcher
            .launch(lease.slot(), seed)
            .and_then(|mut game| {
                let result = drive(&mut game, policy);
                game.finalize();
                result
            });
        lease.release()?;
        result
    }
}

fn drive<G, P>(game: &mut G, policy: &mut P) -> Result<Vec<f64>, SessionError>
where
    G: Game,
    P: Policy + ?Sized,
{
    let mut record = game.init_session()?;
    let mut steps = 0_usize;
    loop {
        match record {
            Record::Terminal { scores } => {
                debug!("episode finished after {steps} step(s): {scores:?}");
                if scores.is_empty() {
                    return Err(SessionError::MissingScore);
                }
                return Ok(scores);
            }
            Record::Observation(obs) => {
                let action = policy.evaluate(&obs.state, obs.phase)?;
                record = game.step(&action)?;
                steps += 1;
            }
        }
    }
}

#[expect(clippy::cast_precision_loss)]
fn mean_scores(episodes: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = episodes.first() else {
        return vec![];
    };
    let n = episodes.len() as f64;
    (0..first.len())
        .map(|player| episodes.iter().map(|scores| scores[player]).sum::<f64>() / n)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, thread, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::game::{CommandTemplate, GameIo, GameKind, ScoreSelection};

    /// Answers `[sum(state), phase]`.
    struct SumPolicy {
        calls: usize,
    }

    impl Policy for SumPolicy {
        fn evaluate(&mut self, state: &[f64], phase: usize) -> Result<Vec<f64>, PolicyError> {
            self.calls += 1;
            #[expect(clippy::cast_precision_loss)]
            let phase = phase as f64;
            Ok(vec![state.iter().sum(), phase])
        }
    }

    struct RejectingPolicy;

    impl Policy for RejectingPolicy {
        fn evaluate(&mut self, _state: &[f64], phase: usize) -> Result<Vec<f64>, PolicyError> {
            Err(PolicyError::UnknownPhase { phase, phases: 0 })
        }
    }

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn spec(script: &Path, args: &[&str], slots: usize, timeout: Duration) -> GameSpec {
        let mut template_args = vec![script.display().to_string()];
        template_args.extend(args.iter().map(|&a| a.to_owned()));
        GameSpec {
            kind: GameKind::Alhambra,
            io: GameIo::single(2, 2),
            command: CommandTemplate {
                program: "sh".to_owned(),
                args: template_args,
                current_dir: None,
            },
            terminal_markers: vec!["SCORE".to_owned()],
            slots,
            base_port: None,
            score_selection: ScoreSelection::FirstPlayer,
            episode_timeout: timeout,
            max_episode_attempts: 3,
        }
    }

    fn options(batch_size: usize, max_attempts: usize) -> SessionOptions {
        SessionOptions {
            batch_size,
            max_attempts,
        }
    }

    #[test]
    fn test_protocol_round_trip() {
        let dir = TempDir::new().unwrap();
        let actions = dir.path().join("actions.txt");
        let script = write_script(
            &dir,
            "engine.sh",
            r#"
echo "engine booting"
echo '{"state": [1, 2], "current_phase": 0}'
read a; echo "$a" >> "$1"
echo "debug: thinking"
echo '{"state": [3, 4], "current_phase": 1, "reward": 1}'
read a; echo "$a" >> "$1"
echo '{"state": [0, 0], "current_phase": 0, "done": 1, "score": [42, 7]}'
"#,
        );
        let actions_arg = actions.display().to_string();
        let spec = spec(&script, &[actions_arg.as_str()], 1, Duration::from_secs(10));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(1, 1));

        let mut policy = SumPolicy { calls: 0 };
        let report = session.play(&mut policy, 0).unwrap();

        assert_eq!(report.scores, vec![42.0, 7.0]);
        assert_eq!(report.retries, 0);
        assert_eq!(policy.calls, 2);
        assert_eq!(fs::read_to_string(&actions).unwrap(), "3 0\n7 1\n");
        assert_eq!(slots.leased(), 0);
    }

    #[test]
    fn test_batch_averages_episode_scores() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "engine.sh",
            r#"echo "{\"done\": 1, \"score\": [$(( $1 * 10 )), 1]}""#,
        );
        let spec = spec(&script, &["{seed}"], 1, Duration::from_secs(10));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(3, 1));

        let report = session.play(&mut SumPolicy { calls: 0 }, 1).unwrap();
        assert_eq!(
            report.episode_scores,
            vec![vec![10.0, 1.0], vec![20.0, 1.0], vec![30.0, 1.0]]
        );
        assert_eq!(report.scores, vec![20.0, 1.0]);
    }

    #[test]
    fn test_marker_terminal_line() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "engine.sh",
            r#"
echo '{"state": [1, 1], "current_phase": 0}'
read a
echo "FINAL SCORE: 128"
"#,
        );
        let spec = spec(&script, &[], 1, Duration::from_secs(10));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(1, 1));
        let report = session.play(&mut SumPolicy { calls: 0 }, 0).unwrap();
        assert_eq!(report.scores, vec![128.0]);
    }

    #[test]
    fn test_hung_engine_is_retried() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("started");
        let script = write_script(
            &dir,
            "engine.sh",
            r#"
if [ ! -e "$1" ]; then
    touch "$1"
    exec sleep 30
fi
echo '{"done": 1, "score": [5]}'
"#,
        );
        let marker_arg = marker.display().to_string();
        let spec = spec(&script, &[marker_arg.as_str()], 1, Duration::from_millis(500));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(1, 3));

        let report = session.play(&mut SumPolicy { calls: 0 }, 0).unwrap();
        assert_eq!(report.scores, vec![5.0]);
        assert_eq!(report.retries, 1);
        assert_eq!(slots.leased(), 0);
    }

    /// `true` while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
            stat.rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z'))
        })
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_hung_engine_behind_launcher_is_killed() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("engine.pid");
        let script = write_script(
            &dir,
            "launcher.sh",
            r#"
if [ ! -e "$1" ]; then
    sleep 300 &
    echo $! > "$1"
    wait
fi
echo '{"done": 1, "score": [5]}'
"#,
        );
        let pid_arg = pid_file.display().to_string();
        let spec = spec(&script, &[pid_arg.as_str()], 1, Duration::from_millis(500));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(1, 3));

        let report = session.play(&mut SumPolicy { calls: 0 }, 0).unwrap();
        assert_eq!(report.retries, 1);
        assert_eq!(slots.leased(), 0);

        let pid = fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let started = Instant::now();
        while is_running(pid) && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!is_running(pid), "engine {pid} outlived its episode");
    }

    #[test]
    fn test_attempts_are_bounded() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "engine.sh", "echo 'starting'\nexit 0\n");
        let spec = spec(&script, &[], 1, Duration::from_secs(10));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(1, 2));

        let err = session.play(&mut SumPolicy { calls: 0 }, 0).unwrap_err();
        let SessionError::AttemptsExhausted { attempts, source } = err else {
            panic!("expected exhausted attempts");
        };
        assert_eq!(attempts, 2);
        assert!(matches!(
            *source,
            SessionError::Process(ProcessError::Closed)
        ));
        assert_eq!(slots.leased(), 0);
    }

    #[test]
    fn test_unstartable_engine_is_fatal() {
        let mut spec = spec(Path::new("unused"), &[], 1, Duration::from_secs(10));
        spec.command.program = "/nonexistent/evoplay-engine".to_owned();
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(2, 3));

        let err = session.play(&mut SumPolicy { calls: 0 }, 0).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Process(ProcessError::Spawn { .. })
        ));
        assert_eq!(slots.leased(), 0);
    }

    #[test]
    fn test_policy_error_is_fatal() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "engine.sh",
            "echo '{\"state\": [1], \"current_phase\": 3}'\nread a\n",
        );
        let spec = spec(&script, &[], 1, Duration::from_secs(10));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(1, 3));

        let err = session.play(&mut RejectingPolicy, 0).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Policy(PolicyError::UnknownPhase { phase: 3, .. })
        ));
    }

    #[test]
    fn test_terminal_without_score_is_fatal() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "engine.sh", "echo '{\"done\": true}'\n");
        let spec = spec(&script, &[], 1, Duration::from_secs(10));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(1, 3));

        let err = session.play(&mut SumPolicy { calls: 0 }, 0).unwrap_err();
        assert!(matches!(err, SessionError::MissingScore));
    }

    #[test]
    fn test_empty_batch() {
        let spec = spec(Path::new("unused"), &[], 1, Duration::from_secs(10));
        let slots = SlotAllocator::new(1).unwrap();
        let session = GameSession::new(ProcessLauncher::new(&spec), &slots, options(0, 1));
        assert!(matches!(
            session.play(&mut SumPolicy { calls: 0 }, 0),
            Err(SessionError::EmptyBatch)
        ));
    }

    #[test]
    fn test_concurrent_sessions_never_share_a_slot() {
        const SLOTS: usize = 2;
        const WORKERS: usize = 6;

        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "engine.sh",
            r#"
if ! mkdir "$2/slot-$1" 2>/dev/null; then
    echo '{"done": 1, "score": [-1]}'
    exit 0
fi
sleep 0.05
rmdir "$2/slot-$1"
echo '{"done": 1, "score": [1]}'
"#,
        );
        let dir_arg = dir.path().display().to_string();
        let spec = spec(&script, &["{slot}", dir_arg.as_str()], SLOTS, Duration::from_secs(10));
        let slots = SlotAllocator::new(SLOTS).unwrap();

        let scores: Vec<f64> = thread::scope(|s| {
            let handles: Vec<_> = (0..WORKERS)
                .map(|worker| {
                    let spec = &spec;
                    let slots = &slots;
                    s.spawn(move || {
                        let session =
                            GameSession::new(ProcessLauncher::new(spec), slots, options(3, 1));
                        session
                            .play(&mut SumPolicy { calls: 0 }, worker as u64)
                            .unwrap()
                            .scores[0]
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(scores, vec![1.0; WORKERS]);
        assert_eq!(slots.leased(), 0);
    }
}
