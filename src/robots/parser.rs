//! Robots.txt policy evaluation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate. Crawl-delay is
//! not part of that crate's API, so it is extracted here.

use crate::config::bounded_secs;
use robotstxt::DefaultMatcher;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Evaluate the stored robots.txt body
    Rules,
    AllowAll,
    DenyAll,
}

/// Parsed robots.txt policy for one site
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    content: String,
    mode: Mode,
}

impl ParsedRobots {
    /// Creates a policy from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            mode: Mode::Rules,
        }
    }

    /// A policy that allows everything (no robots.txt, or a 4xx response)
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            mode: Mode::AllowAll,
        }
    }

    /// A policy that denies everything (fail-closed on an unreachable robots.txt)
    pub fn deny_all() -> Self {
        Self {
            content: String::new(),
            mode: Mode::DenyAll,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - Full URL or path to check (e.g., "/page.html")
    /// * `user_agent` - The product token, e.g. "SumiHarvest"
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self.mode {
            Mode::AllowAll => true,
            Mode::DenyAll => false,
            Mode::Rules => {
                if self.content.trim().is_empty() {
                    return true;
                }
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
            }
        }
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent takes precedence over the `*` group.
    /// Consecutive `User-agent` lines share one group; any other directive
    /// closes the list so the next `User-agent` line starts a new group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.mode != Mode::Rules || self.content.is_empty() {
            return None;
        }

        let normalized_agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_list = false;
        let mut delay_for_wildcard: Option<f64> = None;
        let mut delay_for_agent: Option<f64> = None;

        for line in self.content.lines() {
            // Strip trailing comments
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_list {
                        group_agents.clear();
                        in_agent_list = true;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_agent_list = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }

                    if group_agents
                        .iter()
                        .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
                    {
                        delay_for_agent = Some(delay);
                    } else if group_agents.iter().any(|ua| ua == "*") {
                        delay_for_wildcard = Some(delay);
                    }
                }
                _ => {
                    in_agent_list = false;
                }
            }
        }

        // Site-controlled, so clamped rather than trusted
        delay_for_agent.or(delay_for_wildcard).map(bounded_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_DELAY;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("/any/path", "TestBot"));
        assert!(robots.is_allowed("/admin", "TestBot"));
    }

    #[test]
    fn test_deny_all() {
        let robots = ParsedRobots::deny_all();
        assert!(!robots.is_allowed("/", "TestBot"));
        assert!(!robots.is_allowed("https://example.com/news", "TestBot"));
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn test_parse_disallow_specific() {
        let content = "User-agent: *\nDisallow: /admin";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/", "TestBot"));
        assert!(robots.is_allowed("/page", "TestBot"));
        assert!(!robots.is_allowed("/admin", "TestBot"));
        assert!(!robots.is_allowed("/admin/users", "TestBot"));
    }

    #[test]
    fn test_full_urls_are_matched_on_path() {
        let content = "User-agent: *\nDisallow: /private";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("https://example.com/news/1", "TestBot"));
        assert!(!robots.is_allowed("https://example.com/private/1", "TestBot"));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let content = "User-agent: *\nDisallow: /private\nAllow: /private/public";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed("/private", "TestBot"));
        assert!(robots.is_allowed("/private/public", "TestBot"));
    }

    #[test]
    fn test_parse_specific_user_agent() {
        let content = "User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/page", "GoodBot"));
        assert!(!robots.is_allowed("/page", "BadBot"));
    }

    #[test]
    fn test_empty_robots_txt() {
        let robots = ParsedRobots::from_content("");
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let content = "User-agent: *\nCrawl-delay: 10\nDisallow: /admin";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_specific_agent() {
        let content = "User-agent: TestBot\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_secs(5)));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_decimal() {
        let content = "User-agent: *\nCrawl-delay: 2.5";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_crawl_delay_multiple_user_agents() {
        let content = "User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 3";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("BotA"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotB"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_crawl_delay_groups_do_not_leak() {
        let content = "User-agent: BotA\nDisallow: /x\n\nUser-agent: BotB\nCrawl-delay: 4";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("BotA"), None);
        assert_eq!(robots.crawl_delay("BotB"), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_crawl_delay_ignores_garbage() {
        let content = "User-agent: *\nCrawl-delay: soon\nCrawl-delay: -3";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn test_crawl_delay_is_clamped() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 1e20");
        assert_eq!(robots.crawl_delay("TestHarvester"), Some(MAX_DELAY));

        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 1e400");
        assert_eq!(robots.crawl_delay("TestHarvester"), None);

        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 90000");
        assert_eq!(robots.crawl_delay("TestHarvester"), Some(MAX_DELAY));
    }

    #[test]
    fn test_crawl_delay_with_inline_comment() {
        let content = "User-agent: * # everyone\nCrawl-delay: 7 # be gentle";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("testbot"), Some(Duration::from_secs(7)));
    }
}
