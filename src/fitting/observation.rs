use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::fitting::prelude::*;
use crate::ninarow::prelude::*;

/// One observed human move: the position it was played from, the move itself,
/// the response time in milliseconds, and the participant's identifiers.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub board: FourByNineBoard,
    pub played: Move,
    pub time: f64,
    pub group: u32,
    pub participant: String,
}

impl Observation {
    /// Builds an observation, rejecting moves that are not legal on the given
    /// board or claimed by the wrong player.
    pub fn new(
        board: FourByNineBoard,
        played: Move,
        time: f64,
        group: u32,
        participant: String,
    ) -> Result<Observation> {
        if played.player != board.active_player() {
            return Err(anyhow!(
                "malformed input: {} is not the active player on the given board",
                played.player.notate()
            ));
        }
        board.play(&played)?;
        Ok(Observation { board, played, time, group, participant })
    }
}

/// The canonical record format: tab-separated
/// `black_bits white_bits player move_bitfield time group participant`,
/// with both boards and the move encoded as base-10 bitfields.
impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.board.pieces(Player::Black).bits(),
            self.board.pieces(Player::White).bits(),
            self.played.player.notate(),
            1u64 << self.played.position,
            self.time,
            self.group,
            self.participant
        )
    }
}

impl std::str::FromStr for Observation {
    type Err = Error;
    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut fields: Vec<&str> = line.trim_end().split(',').map(str::trim).collect();
        if fields.len() == 1 {
            fields = line.split_whitespace().collect();
        }
        if fields.len() < 6 {
            return Err(anyhow!(
                "malformed input: expected 6 or 7 fields, received {}: {line}",
                fields.len()
            ));
        }

        let black = FourByNinePattern::try_new(
            fields[0].parse::<u64>().context("malformed input: bad black bitfield")?,
        )?;
        let white = FourByNinePattern::try_new(
            fields[1].parse::<u64>().context("malformed input: bad white bitfield")?,
        )?;
        if !(black & white).is_empty() {
            return Err(anyhow!("malformed input: black and white bitfields overlap"));
        }
        let board = FourByNineBoard::new(black, white);
        let player = Player::parse(fields[2])?;

        let bitfield = fields[3].parse::<u64>().context("malformed input: bad move bitfield")?;
        if bitfield.count_ones() != 1 {
            return Err(anyhow!(
                "malformed input: move {bitfield} must be a bitfield with a single bit set"
            ));
        }
        FourByNinePattern::try_new(bitfield)?;
        let position = bitfield.trailing_zeros() as usize;

        let time = fields[4].parse::<f64>().context("malformed input: bad move time")?;
        let (group, participant) = if fields.len() == 6 {
            (1, fields[5].to_owned())
        } else {
            (fields[5].parse::<u32>().context("malformed input: bad group id")?, fields[6].to_owned())
        };

        Observation::new(board, Move::new(position, player, 0.0), time, group, participant)
    }
}

/// Parses CSV content line by line. Malformed lines are logged and dropped;
/// ingestion continues.
pub fn parse_participant_csv(content: &str) -> Vec<Observation> {
    let mut out = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Observation>() {
            Ok(observation) => out.push(observation),
            Err(e) => log::warn!("dropping malformed record on line {}: {e}", number + 1),
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct ParticipantRecord {
    free_play: Vec<Option<FreePlayGame>>,
}

#[derive(Debug, Deserialize)]
struct FreePlayGame {
    solution: String,
    player_color: String,
    #[serde(rename = "all_move_RT")]
    all_move_rt: Vec<f64>,
}

/// Rebuilds the observations of one recorded game by replaying its solution
/// string from the empty board. Only the moves made by the participant's
/// color become observations.
fn replay_game(game: &FreePlayGame, group: u32, participant: &str) -> Result<Vec<Observation>> {
    let grammar = Regex::new(r"^[0-9]+(-[0-9]+)*$").expect("the solution grammar is valid");
    if !grammar.is_match(&game.solution) {
        return Err(anyhow!("malformed input: bad solution string {}", game.solution));
    }
    let observed_color = Player::parse(&game.player_color)?;

    let mut board = FourByNineBoard::default();
    let mut player = Player::Black;
    let mut out = Vec::new();
    for token in game.solution.split('-') {
        let position = token.parse::<usize>().context("malformed input: bad square index")?;
        let mv = Move::new(position, player, 0.0);
        if player == observed_color {
            let time = game
                .all_move_rt
                .get(out.len())
                .copied()
                .ok_or_else(|| anyhow!("malformed input: fewer move times than moves"))?;
            out.push(Observation::new(board, mv, time, group, participant.to_owned())?);
        }
        board = board.play(&mv)?;
        player = -player;
    }
    Ok(out)
}

fn parse_participant_json(content: &str, group: u32, participant: &str) -> Result<Vec<Observation>> {
    let record: ParticipantRecord = serde_json::from_str(content)?;
    let mut out = Vec::new();
    for game in record.free_play.iter().flatten() {
        match replay_game(game, group, participant) {
            Ok(observations) => out.extend(observations),
            Err(e) => log::warn!("skipping malformed game {}: {e}", game.solution),
        }
    }
    Ok(out)
}

/// Parses a participant file, trying JSON first and falling back to CSV.
pub fn parse_participant_file(path: &Path) -> Result<Vec<Observation>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read participant file {}", path.display()))?;
    match parse_participant_json(&content, 1, "1") {
        Ok(observations) => Ok(observations),
        Err(_) => {
            log::info!("{} is not a JSON record, attempting CSV", path.display());
            Ok(parse_participant_csv(&content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_participant_csv, parse_participant_json, Observation};
    use crate::ninarow::prelude::*;

    #[test]
    fn csv_roundtrip() {
        // White on squares 33, 34, 35; Black on 0, 1, 2, playing square 3.
        let line = "7\t60129542144\tBlack\t8\t1250\t2\tsubject-11";
        let observation = line.parse::<Observation>().unwrap();
        assert_eq!(observation.played.position, 3);
        assert_eq!(observation.played.player, Player::Black);
        assert_eq!(observation.group, 2);
        assert_eq!(observation.to_string().parse::<Observation>().unwrap(), observation);
    }

    #[test]
    fn comma_separation_and_default_group() {
        let line = "0,0,Black,4096,900,anon";
        let observation = line.parse::<Observation>().unwrap();
        assert_eq!(observation.played.position, 12);
        assert_eq!(observation.group, 1);
        assert_eq!(observation.participant, "anon");
    }

    #[test]
    fn invalid_lines_are_rejected() {
        // Overlapping bitfields.
        assert!("3,1,Black,8,100,p".parse::<Observation>().is_err());
        // Wrong active player.
        assert!("1,0,Black,8,100,p".parse::<Observation>().is_err());
        // Move onto an occupied square.
        assert!("1,2,Black,1,100,p".parse::<Observation>().is_err());
        // Two bits set in the move field.
        assert!("0,0,Black,3,100,p".parse::<Observation>().is_err());
        // Move bit out of board range.
        assert!(format!("0,0,Black,{},100,p", 1u64 << 36).parse::<Observation>().is_err());
        // Board bits out of range.
        assert!(format!("{},0,Black,8,100,p", 1u64 << 36).parse::<Observation>().is_err());
    }

    #[test]
    fn csv_ingestion_drops_bad_lines_and_continues() {
        let content = "0\t0\tBlack\t8\t100\tp\nnot a record\n0\t0\tblack\t16\t100\tp\n";
        let observations = parse_participant_csv(content);
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[1].played.position, 4);
    }

    #[test]
    fn json_games_replay_into_observations() {
        let content = r#"{
            "free_play": [
                {"solution": "13-22-4", "player_color": "Black", "all_move_RT": [800.0, 650.0]},
                null,
                {"solution": "13-13", "player_color": "White", "all_move_RT": [500.0]}
            ]
        }"#;
        let observations = parse_participant_json(content, 1, "1").unwrap();
        // The first game contributes Black's two moves; the second replays an
        // occupied square and is skipped whole.
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].played.position, 13);
        assert_eq!(observations[0].time, 800.0);
        assert_eq!(observations[1].played.position, 4);
        assert_eq!(observations[1].board.piece_count(), 2);
    }
}
