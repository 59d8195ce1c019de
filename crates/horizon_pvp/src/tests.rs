//! Cross-actor scenarios: queue + supervisor + match actors + season scheduler
//! with in-memory collaborators.

use crate::config::{MatchTimings, QueueConfig, SeasonConfig};
use crate::error::{MatchError, QueueError};
use crate::matches::{ActionOutcome, MatchHandle, MatchPhase, VictoryReason};
use crate::queue::{spawn_arena_queue, ArenaQueueHandle, ArenaTeam, MatchLauncher};
use crate::season::spawn_season_scheduler;
use crate::supervisor::MatchSupervisor;
use chrono::{DateTime, TimeZone, Utc};
use horizon_contracts::{
    BattlegroundTemplate, Bracket, CharacterId, Currency, DefenseTemplate, InMemoryCollaborators,
    ObjectiveKind, ObjectiveTemplate, OutboundMessage, RatingRecord, Side, StaticTemplateStore,
    TeamId, TemplateCatalog, WarplotTemplate,
};
use std::sync::Arc;
use std::time::Duration;

const BATTLEGROUND: u32 = 1;
const SHORT_BATTLEGROUND: u32 = 2;
const WARPLOT: u32 = 1;

fn timings() -> MatchTimings {
    MatchTimings {
        preparation: Duration::from_secs(10),
        active: Duration::from_secs(60),
        ending: Duration::from_secs(5),
        cleanup: Duration::from_secs(5),
        score_tick: Duration::from_secs(1),
        mailbox_capacity: 16,
    }
}

fn battleground(id: u32, score_limit: u32) -> BattlegroundTemplate {
    BattlegroundTemplate {
        id,
        name: format!("Battleground {id}"),
        team_size: 10,
        score_limit,
        kill_points: 10,
        objectives: vec![
            ObjectiveTemplate {
                id: 1,
                name: "Shrine".into(),
                kind: ObjectiveKind::ControlPoint,
                capture_points: 50,
                points_per_tick: 5,
            },
            ObjectiveTemplate {
                id: 2,
                name: "Vein".into(),
                kind: ObjectiveKind::ResourceNode,
                capture_points: 0,
                points_per_tick: 20,
            },
        ],
    }
}

fn warplot() -> WarplotTemplate {
    WarplotTemplate {
        id: WARPLOT,
        name: "Proving Grounds".into(),
        team_size: 30,
        score_limit: 100_000,
        generators_per_side: 1,
        generator_health: 100,
        generator_points: 500,
        kill_points: 10,
        coins_per_tick: 10,
        coins_per_kill: 5,
        plug_slots: 4,
        defenses: vec![DefenseTemplate {
            id: 1,
            name: "Turret".into(),
            cost: 30,
        }],
        energy_nodes: Vec::new(),
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

fn memory() -> InMemoryCollaborators {
    let catalog = TemplateCatalog {
        battlegrounds: vec![battleground(BATTLEGROUND, 1_000), battleground(SHORT_BATTLEGROUND, 50)],
        warplots: vec![warplot()],
        ..TemplateCatalog::default()
    };
    InMemoryCollaborators::new(StaticTemplateStore::from_catalog(catalog), now())
}

fn chars(ids: &[u64]) -> Vec<CharacterId> {
    ids.iter().map(|&id| CharacterId(id)).collect()
}

fn team(id: u64, members: &[u64], rating: u32) -> ArenaTeam {
    ArenaTeam {
        team: TeamId(id),
        roster: chars(members),
        rating,
    }
}

struct Pvp {
    memory: InMemoryCollaborators,
    supervisor: Arc<MatchSupervisor>,
    queue: ArenaQueueHandle,
}

fn pvp() -> Pvp {
    let memory = memory();
    let supervisor = Arc::new(MatchSupervisor::new(timings(), memory.bundle()));
    let launcher: Arc<dyn MatchLauncher> = supervisor.clone();
    let (queue, _task) = spawn_arena_queue(QueueConfig::default(), memory.bundle(), launcher);
    supervisor.attach_queue(queue.clone());
    Pvp {
        memory,
        supervisor,
        queue,
    }
}

async fn wait(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

async fn phase(handle: &MatchHandle) -> MatchPhase {
    handle.snapshot().await.unwrap().phase
}

async fn phases_broadcast(memory: &InMemoryCollaborators) -> Vec<String> {
    memory
        .broadcaster
        .sent()
        .await
        .into_iter()
        .filter_map(|m| match m.message {
            OutboundMessage::MatchPhase { phase, .. } => Some(phase),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn close_ratings_match_on_first_queue_check() {
    let pvp = pvp();
    for (team, rating) in [(1, 1500), (2, 1520)] {
        pvp.memory
            .persistence
            .insert_rating(RatingRecord::new(TeamId(team), Bracket::TwoVsTwo, rating));
    }

    let first = pvp.queue.join(TeamId(1), chars(&[11, 12]), Bracket::TwoVsTwo).await.unwrap();
    let second = pvp.queue.join(TeamId(2), chars(&[21, 22]), Bracket::TwoVsTwo).await.unwrap();
    assert_eq!((first.rating, first.window), (1500, 100));
    assert_eq!((second.rating, second.window), (1520, 100));

    wait(4).await;
    assert!(pvp.queue.status(TeamId(1)).await.unwrap().is_some());
    assert_eq!(pvp.supervisor.count(), 0);

    wait(2).await;
    assert!(pvp.queue.status(TeamId(1)).await.unwrap().is_none());
    assert!(pvp.queue.status(TeamId(2)).await.unwrap().is_none());
    assert_eq!(pvp.supervisor.count_kind("arena"), 1);

    let popped = pvp
        .memory
        .broadcaster
        .matching(|m| matches!(m, OutboundMessage::QueuePopped { .. }))
        .await;
    assert_eq!(popped.len(), 2);
    assert_eq!(popped[0].recipients, Some(chars(&[11, 12])));
    assert_eq!(popped[1].recipients, Some(chars(&[21, 22])));
}

#[tokio::test(start_paused = true)]
async fn outlier_waits_for_window_expansion() {
    let pvp = pvp();
    for (team, rating) in [(1, 1500), (2, 1700)] {
        pvp.memory
            .persistence
            .insert_rating(RatingRecord::new(TeamId(team), Bracket::TwoVsTwo, rating));
    }
    pvp.queue.join(TeamId(1), chars(&[11, 12]), Bracket::TwoVsTwo).await.unwrap();
    pvp.queue.join(TeamId(2), chars(&[21, 22]), Bracket::TwoVsTwo).await.unwrap();

    wait(31).await;
    let status = pvp.queue.status(TeamId(1)).await.unwrap().unwrap();
    assert_eq!(status.window, 150);
    assert_eq!(pvp.supervisor.count(), 0);

    wait(28).await;
    assert!(pvp.queue.status(TeamId(1)).await.unwrap().is_some());

    wait(7).await;
    assert!(pvp.queue.status(TeamId(1)).await.unwrap().is_none());
    assert_eq!(pvp.supervisor.count_kind("arena"), 1);
}

#[tokio::test(start_paused = true)]
async fn kill_during_preparation_is_rejected() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_battleground(BATTLEGROUND, chars(&[1, 2]), chars(&[3, 4]))
        .unwrap();

    let err = handle.report_kill(CharacterId(1), CharacterId(3)).await.unwrap_err();
    assert_eq!(err, MatchError::NotActive(MatchPhase::Preparation));
    assert!(err.to_string().starts_with("Match not active"));
    assert_eq!(
        handle.interact_objective(CharacterId(1), 1).await,
        Err(MatchError::NotActive(MatchPhase::Preparation))
    );

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, MatchPhase::Preparation);
    assert_eq!((snapshot.score.red, snapshot.score.blue), (0, 0));
    assert!(snapshot.participants.iter().all(|p| p.stats.kills == 0 && p.stats.deaths == 0));
}

#[tokio::test(start_paused = true)]
async fn match_runs_every_phase_in_order() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_battleground(BATTLEGROUND, chars(&[1, 2]), chars(&[3, 4]))
        .unwrap();
    let match_id = handle.match_id();

    wait(11).await;
    assert_eq!(phase(&handle).await, MatchPhase::Active);
    let score = handle.report_kill(CharacterId(1), CharacterId(3)).await.unwrap();
    assert_eq!((score.red, score.blue), (10, 0));

    // Active ends on the timer at 70s with red ahead
    wait(60).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, MatchPhase::Ending);
    let victory = snapshot.victory.unwrap();
    assert_eq!(victory.winner, Some(Side::Red));
    assert_eq!(victory.reason, VictoryReason::Timeout);
    assert_eq!(
        handle.report_kill(CharacterId(2), CharacterId(4)).await,
        Err(MatchError::NotActive(MatchPhase::Ending))
    );

    wait(3).await;
    assert_eq!(phase(&handle).await, MatchPhase::Ending);
    assert!(pvp.memory.persistence.matches().await.is_empty());

    wait(2).await;
    assert_eq!(phase(&handle).await, MatchPhase::Complete);
    let records = pvp.memory.persistence.matches().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].match_id, match_id);
    assert_eq!(records[0].winner, Some(Side::Red));
    assert_eq!((records[0].red_score, records[0].blue_score), (10, 0));
    assert_eq!(records[0].duration_secs, 60);
    assert_eq!(pvp.supervisor.finished(), 1);

    let rewards = pvp.memory.persistence.rewards().await;
    assert_eq!(rewards.len(), 4);
    for reward in rewards {
        assert_eq!(reward.currency, Currency::Prestige);
        let expected = if reward.character.0 <= 2 { 200 } else { 50 };
        assert_eq!(reward.amount, expected, "{}", reward.character);
    }

    assert_eq!(
        phases_broadcast(&pvp.memory).await,
        vec!["preparation", "active", "ending", "complete"]
    );

    wait(6).await;
    assert_eq!(pvp.supervisor.lookup(match_id).err(), Some(MatchError::NotFound(match_id)));
    assert!(!handle.is_alive());
}

#[tokio::test(start_paused = true)]
async fn tied_timeout_is_a_draw() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_battleground(BATTLEGROUND, chars(&[1]), chars(&[2]))
        .unwrap();

    wait(11).await;
    handle.report_kill(CharacterId(1), CharacterId(2)).await.unwrap();
    handle.report_kill(CharacterId(2), CharacterId(1)).await.unwrap();

    wait(60).await;
    let victory = handle.snapshot().await.unwrap().victory.unwrap();
    assert_eq!(victory.winner, None);

    wait(5).await;
    let rewards = pvp.memory.persistence.rewards().await;
    assert!(rewards.iter().all(|r| r.amount == 100));
    let results = pvp
        .memory
        .broadcaster
        .matching(|m| matches!(m, OutboundMessage::MatchResult { winner: None, .. }))
        .await;
    assert_eq!(results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn held_objectives_score_on_the_tick() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_battleground(BATTLEGROUND, chars(&[1]), chars(&[2]))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(
        handle.capture_resource(CharacterId(2), 2).await,
        Ok(ActionOutcome::Captured { objective_id: 2, side: Side::Blue })
    );
    assert_eq!(
        handle.capture_resource(CharacterId(1), 1).await,
        Err(MatchError::WrongObjectiveKind(1))
    );

    // Ticks at 11s, 12s and 13s
    wait(3).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.score.blue, 60);
    assert_eq!(snapshot.score.red, 0);
    let scores = pvp
        .memory
        .broadcaster
        .matching(|m| matches!(m, OutboundMessage::MatchScore { .. }))
        .await;
    assert_eq!(scores.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn reaching_the_score_limit_ends_the_match_early() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_battleground(SHORT_BATTLEGROUND, chars(&[1]), chars(&[2]))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(
        handle.interact_objective(CharacterId(1), 1).await,
        Ok(ActionOutcome::Captured { objective_id: 1, side: Side::Red })
    );
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, MatchPhase::Ending);
    let victory = snapshot.victory.unwrap();
    assert_eq!(victory.winner, Some(Side::Red));
    assert_eq!(victory.reason, VictoryReason::ScoreLimit);
    let shrine_holder = snapshot
        .participants
        .iter()
        .find(|p| p.character == CharacterId(1))
        .map(|p| p.stats.objectives);
    assert_eq!(shrine_holder, Some(1));
}

#[tokio::test(start_paused = true)]
async fn destroying_generators_wins_a_warplot() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_warplot(WARPLOT, chars(&[1, 2]), chars(&[3]))
        .unwrap();

    assert_eq!(
        handle.damage_generator(CharacterId(1), 2, 50).await,
        Err(MatchError::NotActive(MatchPhase::Preparation))
    );

    // Coins after the ticks at 11s, 12s and 13s pay for a turret
    tokio::time::sleep(Duration::from_millis(13_500)).await;
    assert_eq!(
        handle.install_defense(CharacterId(3), 1, 0).await,
        Ok(ActionOutcome::DefenseInstalled { defense_id: 1, slot: 0, coins_left: 0 })
    );

    assert_eq!(handle.damage_generator(CharacterId(1), 1, 10).await, Err(MatchError::OwnGenerator(1)));
    assert_eq!(
        handle.damage_generator(CharacterId(1), 2, 60).await,
        Ok(ActionOutcome::GeneratorDamaged { generator_id: 2, health: 40 })
    );
    assert_eq!(
        handle.damage_generator(CharacterId(2), 2, 60).await,
        Ok(ActionOutcome::GeneratorDestroyed { generator_id: 2 })
    );

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, MatchPhase::Ending);
    let victory = snapshot.victory.unwrap();
    assert_eq!(victory.winner, Some(Side::Red));
    assert_eq!(victory.reason, VictoryReason::Objective);

    wait(6).await;
    let record = pvp.memory.persistence.matches().await.remove(0);
    assert_eq!(record.kind, "warplot");
    let damage: Vec<(u64, u64)> = record.participants.iter().map(|p| (p.character.0, p.damage)).collect();
    assert_eq!(damage, vec![(1, 60), (2, 40), (3, 0)]);
    let rewards = pvp.memory.persistence.rewards().await;
    assert!(rewards.iter().all(|r| r.currency == Currency::WarCoins));
}

#[tokio::test(start_paused = true)]
async fn arena_elimination_moves_ratings() {
    let pvp = pvp();
    pvp.memory
        .persistence
        .insert_rating(RatingRecord::new(TeamId(1), Bracket::TwoVsTwo, 1500));

    let handle = pvp
        .supervisor
        .start_arena(Bracket::TwoVsTwo, team(1, &[1, 2], 1500), team(2, &[3, 4], 1500))
        .unwrap();

    wait(11).await;
    handle.report_kill(CharacterId(1), CharacterId(3)).await.unwrap();
    assert_eq!(phase(&handle).await, MatchPhase::Active);
    handle.report_kill(CharacterId(2), CharacterId(4)).await.unwrap();

    let victory = handle.snapshot().await.unwrap().victory.unwrap();
    assert_eq!(victory.winner, Some(Side::Red));
    assert_eq!(victory.reason, VictoryReason::Elimination);

    wait(6).await;
    let red = pvp.memory.persistence.rating_of(TeamId(1), Bracket::TwoVsTwo).unwrap();
    let blue = pvp.memory.persistence.rating_of(TeamId(2), Bracket::TwoVsTwo).unwrap();
    assert_eq!((red.rating, red.games_won, red.win_streak), (1520, 1, 1));
    assert_eq!((blue.rating, blue.games_played, blue.loss_streak), (1480, 1, 1));
    assert_eq!(red.last_game_at, Some(now()));
    assert!(pvp.memory.persistence.rewards().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deserters_are_flagged_in_the_queue() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_battleground(BATTLEGROUND, chars(&[1, 2]), chars(&[3, 4]))
        .unwrap();

    // Leaving before the start is not desertion
    handle.leave(CharacterId(4)).await.unwrap();
    wait(11).await;
    assert_eq!(pvp.queue.deserter_remaining(CharacterId(4)).await.unwrap(), None);

    handle.leave(CharacterId(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        pvp.queue.deserter_remaining(CharacterId(1)).await.unwrap(),
        Some(chrono::Duration::minutes(15))
    );
    assert_eq!(
        pvp.queue.join(TeamId(9), chars(&[1, 5]), Bracket::TwoVsTwo).await,
        Err(QueueError::Deserter(CharacterId(1)))
    );
    assert_eq!(phase(&handle).await, MatchPhase::Active);

    // Blue's last player leaving forfeits the match
    handle.leave(CharacterId(3)).await.unwrap();
    let victory = handle.snapshot().await.unwrap().victory.unwrap();
    assert_eq!(victory.winner, Some(Side::Red));
    assert_eq!(victory.reason, VictoryReason::Forfeit);

    wait(6).await;
    let record = pvp.memory.persistence.matches().await.remove(0);
    let deserted: Vec<u64> = record
        .participants
        .iter()
        .filter(|p| p.deserted)
        .map(|p| p.character.0)
        .collect();
    assert_eq!(deserted, vec![1, 3]);
    let paid: Vec<u64> = pvp
        .memory
        .persistence
        .rewards()
        .await
        .iter()
        .map(|r| r.character.0)
        .collect();
    assert_eq!(paid, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn deserters_and_allies_cannot_score() {
    let pvp = pvp();
    let handle = pvp
        .supervisor
        .start_battleground(BATTLEGROUND, chars(&[1, 2]), chars(&[3, 4]))
        .unwrap();

    wait(11).await;
    handle.leave(CharacterId(4)).await.unwrap();
    assert_eq!(
        handle.interact_objective(CharacterId(4), 1).await,
        Err(MatchError::Deserted(CharacterId(4)))
    );
    assert_eq!(
        handle.capture_resource(CharacterId(4), 2).await,
        Err(MatchError::Deserted(CharacterId(4)))
    );
    assert_eq!(
        handle.report_kill(CharacterId(4), CharacterId(1)).await,
        Err(MatchError::Deserted(CharacterId(4)))
    );
    assert_eq!(
        handle.report_kill(CharacterId(1), CharacterId(4)).await,
        Err(MatchError::Deserted(CharacterId(4)))
    );
    assert_eq!(
        handle.report_kill(CharacterId(1), CharacterId(1)).await,
        Err(MatchError::FriendlyKill {
            killer: CharacterId(1),
            victim: CharacterId(1)
        })
    );
    assert_eq!(
        handle.report_kill(CharacterId(1), CharacterId(2)).await,
        Err(MatchError::FriendlyKill {
            killer: CharacterId(1),
            victim: CharacterId(2)
        })
    );

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!((snapshot.score.red, snapshot.score.blue), (0, 0));
    assert!(snapshot.participants.iter().all(|p| p.stats.kills == 0 && p.stats.deaths == 0));
    assert_eq!(snapshot.phase, MatchPhase::Active);

    // Players still in the match score as usual
    let score = handle.report_kill(CharacterId(3), CharacterId(1)).await.unwrap();
    assert_eq!((score.red, score.blue), (0, 10));
}

#[tokio::test(start_paused = true)]
async fn crashed_match_does_not_affect_others() {
    let pvp = pvp();
    let doomed = pvp
        .supervisor
        .start_battleground(BATTLEGROUND, chars(&[1]), chars(&[2]))
        .unwrap();
    let survivor = pvp
        .supervisor
        .start_warplot(WARPLOT, chars(&[3]), chars(&[4]))
        .unwrap();
    assert_eq!(pvp.supervisor.count(), 2);

    doomed.crash().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!doomed.is_alive());
    assert_eq!(
        pvp.supervisor.lookup(doomed.match_id()).err(),
        Some(MatchError::NotFound(doomed.match_id()))
    );
    assert_eq!(pvp.supervisor.count(), 1);
    assert_eq!(phase(&survivor).await, MatchPhase::Preparation);
    assert!(doomed.snapshot().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn supervisor_validates_rosters_and_falls_back_to_stubs() {
    let pvp = pvp();
    assert_eq!(
        pvp.supervisor.start_battleground(BATTLEGROUND, Vec::new(), chars(&[1])).err(),
        Some(MatchError::EmptyRoster)
    );
    assert_eq!(
        pvp.supervisor
            .start_arena(Bracket::TwoVsTwo, team(1, &[1, 2, 3], 1500), team(2, &[4, 5], 1500))
            .err(),
        Some(MatchError::RosterTooLarge { limit: 2, actual: 3 })
    );

    let stub = pvp
        .supervisor
        .start_battleground(99, chars(&[1]), chars(&[2]))
        .unwrap();
    match stub.snapshot().await.unwrap().rules {
        crate::matches::RulesView::Battleground { objectives } => assert!(objectives.is_empty()),
        other => panic!("unexpected rules {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_matches_and_refuses_new_ones() {
    let pvp = pvp();
    pvp.supervisor
        .start_battleground(BATTLEGROUND, chars(&[1]), chars(&[2]))
        .unwrap();
    pvp.supervisor
        .start_arena(Bracket::TwoVsTwo, team(1, &[3, 4], 1500), team(2, &[5, 6], 1500))
        .unwrap();

    pvp.supervisor.shutdown_all(Duration::from_secs(1)).await;
    assert_eq!(pvp.supervisor.count(), 0);
    assert_eq!(
        pvp.supervisor.start_warplot(WARPLOT, chars(&[1]), chars(&[2])).err(),
        Some(MatchError::ShuttingDown)
    );
}

#[tokio::test]
async fn season_pass_decays_then_finalises_each_bracket_once() {
    let memory = memory();
    let day = |d: u32| Utc.with_ymd_and_hms(2024, 6, d, 12, 0, 0).unwrap();
    let seed = |team: u64, bracket: Bracket, rating: u32, last_game: DateTime<Utc>| {
        let mut record = RatingRecord::new(TeamId(team), bracket, rating);
        record.season_high = rating + 50;
        record.last_game_at = Some(last_game);
        memory.persistence.insert_rating(record);
    };
    seed(1, Bracket::ThreeVsThree, 2200, day(1));
    seed(2, Bracket::ThreeVsThree, 2000, day(9));
    seed(3, Bracket::TwoVsTwo, 1900, day(1));
    seed(4, Bracket::FiveVsFive, 2400, day(1));
    memory.persistence.fail_bracket(Bracket::FiveVsFive);

    let config = SeasonConfig {
        season_end: Some(day(30)),
        ..SeasonConfig::default()
    };
    let (scheduler, _task) = spawn_season_scheduler(config, memory.bundle());

    let pass = scheduler.run_now().await.unwrap();
    assert_eq!(pass.decayed, 2);
    assert!(pass.finalized.is_empty());
    assert_eq!(pass.failed, vec![Bracket::FiveVsFive]);

    let decayed = memory.persistence.rating_of(TeamId(1), Bracket::ThreeVsThree).unwrap();
    assert_eq!(decayed.rating, 2175);
    assert_eq!(decayed.last_decay_at, Some(now()));
    let active = memory.persistence.rating_of(TeamId(2), Bracket::ThreeVsThree).unwrap();
    assert_eq!(active.rating, 2000);

    // Decayed a moment ago, so nothing more until the window passes again
    assert_eq!(scheduler.run_now().await.unwrap().decayed, 0);

    memory.clock.set(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
    let pass = scheduler.run_now().await.unwrap();
    assert_eq!(pass.decayed, 0);
    assert_eq!(
        pass.finalized,
        vec![Bracket::TwoVsTwo, Bracket::ThreeVsThree, Bracket::Battleground, Bracket::Warplot]
    );
    assert_eq!(pass.failed, vec![Bracket::FiveVsFive]);

    let mut results: Vec<(u64, u32, u32, u32)> = memory
        .persistence
        .season_results()
        .await
        .iter()
        .map(|r| (r.team_id.0, r.final_rating, r.season_high, r.reward))
        .collect();
    results.sort();
    assert_eq!(results, vec![(1, 2175, 2250, 600), (2, 2000, 2050, 300), (3, 1875, 1950, 300)]);

    let again = scheduler.run_now().await.unwrap();
    assert!(again.finalized.is_empty());
    assert_eq!(memory.persistence.season_results().await.len(), 3);

    scheduler.stop().await.unwrap();
}
