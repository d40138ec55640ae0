/// The 30 franchises a draw assigns, in canonical order.
pub const NBA_TEAMS: [&str; 30] = [
    "Atlanta Hawks",
    "Boston Celtics",
    "Brooklyn Nets",
    "Charlotte Hornets",
    "Chicago Bulls",
    "Cleveland Cavaliers",
    "Dallas Mavericks",
    "Denver Nuggets",
    "Detroit Pistons",
    "Golden State Warriors",
    "Houston Rockets",
    "Indiana Pacers",
    "LA Clippers",
    "Los Angeles Lakers",
    "Memphis Grizzlies",
    "Miami Heat",
    "Milwaukee Bucks",
    "Minnesota Timberwolves",
    "New Orleans Pelicans",
    "New York Knicks",
    "Oklahoma City Thunder",
    "Orlando Magic",
    "Philadelphia 76ers",
    "Phoenix Suns",
    "Portland Trail Blazers",
    "Sacramento Kings",
    "San Antonio Spurs",
    "Toronto Raptors",
    "Utah Jazz",
    "Washington Wizards",
];

pub const TEAM_COUNT: usize = NBA_TEAMS.len();

pub fn is_known_team(name: &str) -> bool {
    NBA_TEAMS.contains(&name)
}

/// Nickname, e.g. "Celtics" for "Boston Celtics".
pub fn short_name(team: &str) -> &str {
    team.rsplit(' ').next().unwrap_or(team)
}
