use chrono::{DateTime, Utc};

use super::domain::{Listing, ListingId, ListingMetrics, ProfileFields};

/// 2024-01-15T09:00:00Z, the publication date shared by the compiled-in listings.
const SEEDED_AT: i64 = 1_705_309_200;

struct SeedEntry {
    id: &'static str,
    slug: &'static str,
    name: &'static str,
    company: &'static str,
    title: &'static str,
    location: &'static str,
    years: u16,
    specializations: &'static [&'static str],
    industries: &'static [&'static str],
    placements: u32,
    featured: bool,
}

const ENTRIES: &[SeedEntry] = &[
    SeedEntry {
        id: "lst-seed-001",
        slug: "sarah-chen",
        name: "Sarah Chen",
        company: "Apex Talent Partners",
        title: "Principal Technical Recruiter",
        location: "San Francisco, CA",
        years: 12,
        specializations: &["Software Engineering", "Machine Learning"],
        industries: &["Technology", "Fintech"],
        placements: 340,
        featured: true,
    },
    SeedEntry {
        id: "lst-seed-002",
        slug: "marcus-johnson",
        name: "Marcus Johnson",
        company: "Keystone Search Group",
        title: "Executive Search Director",
        location: "New York, NY",
        years: 18,
        specializations: &["C-Suite", "Board Placements"],
        industries: &["Financial Services"],
        placements: 210,
        featured: true,
    },
    SeedEntry {
        id: "lst-seed-003",
        slug: "priya-patel",
        name: "Priya Patel",
        company: "CareBridge Staffing",
        title: "Healthcare Recruitment Lead",
        location: "Chicago, IL",
        years: 9,
        specializations: &["Nursing", "Allied Health"],
        industries: &["Healthcare"],
        placements: 520,
        featured: false,
    },
    SeedEntry {
        id: "lst-seed-004",
        slug: "david-okafor",
        name: "David Okafor",
        company: "Northline Recruiting",
        title: "Senior Engineering Recruiter",
        location: "Austin, TX",
        years: 7,
        specializations: &["DevOps", "Cloud Infrastructure"],
        industries: &["Technology"],
        placements: 185,
        featured: false,
    },
    SeedEntry {
        id: "lst-seed-005",
        slug: "elena-rossi",
        name: "Elena Rossi",
        company: "Meridian Consulting",
        title: "Talent Acquisition Partner",
        location: "Boston, MA",
        years: 11,
        specializations: &["Life Sciences", "Clinical Research"],
        industries: &["Biotech", "Pharmaceuticals"],
        placements: 260,
        featured: false,
    },
    SeedEntry {
        id: "lst-seed-006",
        slug: "james-whitfield",
        name: "James Whitfield",
        company: "Summit Sales Talent",
        title: "Sales Recruitment Manager",
        location: "Denver, CO",
        years: 14,
        specializations: &["Enterprise Sales", "Account Management"],
        industries: &["SaaS"],
        placements: 410,
        featured: false,
    },
    SeedEntry {
        id: "lst-seed-007",
        slug: "aisha-rahman",
        name: "Aisha Rahman",
        company: "Ledger & Co Search",
        title: "Finance Recruiting Specialist",
        location: "Seattle, WA",
        years: 8,
        specializations: &["Accounting", "FP&A"],
        industries: &["Financial Services", "Technology"],
        placements: 230,
        featured: false,
    },
    SeedEntry {
        id: "lst-seed-008",
        slug: "tom-nguyen",
        name: "Tom Nguyen",
        company: "Crafted Creative Talent",
        title: "Creative Recruiter",
        location: "Los Angeles, CA",
        years: 6,
        specializations: &["Product Design", "Brand Marketing"],
        industries: &["Media", "Consumer"],
        placements: 150,
        featured: false,
    },
];

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Directory entries used to bootstrap an empty store.
pub fn seed_listings() -> Vec<Listing> {
    let at = DateTime::<Utc>::from_timestamp(SEEDED_AT, 0).unwrap_or_default();
    ENTRIES
        .iter()
        .map(|entry| Listing {
            id: ListingId(entry.id.to_string()),
            slug: entry.slug.to_string(),
            profile: ProfileFields {
                display_name: entry.name.to_string(),
                email: format!("{}@directory.local", entry.slug),
                phone: None,
                company: entry.company.to_string(),
                job_title: entry.title.to_string(),
                location: entry.location.to_string(),
                website: None,
                linkedin_url: Some(format!("https://www.linkedin.com/in/{}", entry.slug)),
                photo_url: None,
                bio: format!(
                    "{} is a {} at {} with {} years of experience placing {} talent.",
                    entry.name,
                    entry.title.to_lowercase(),
                    entry.company,
                    entry.years,
                    entry.specializations.join(" and ").to_lowercase()
                ),
                years_experience: Some(entry.years),
                specializations: owned(entry.specializations),
                industries: owned(entry.industries),
                achievements: Vec::new(),
                languages: owned(&["English"]),
            },
            category_ids: Vec::new(),
            metrics: ListingMetrics {
                total_placements: entry.placements,
                ..ListingMetrics::default()
            },
            approved: true,
            hidden: false,
            featured: entry.featured,
            created_at: at,
            updated_at: at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pipeline::normalizer::is_canonical_slug;
    use std::collections::BTreeSet;

    #[test]
    fn seed_slugs_are_unique_and_canonical() {
        let listings = seed_listings();
        assert_eq!(listings.len(), 8);
        let slugs: BTreeSet<_> = listings.iter().map(|l| l.slug.as_str()).collect();
        assert_eq!(slugs.len(), listings.len());
        assert!(listings.iter().all(|l| is_canonical_slug(&l.slug)));
        assert!(listings.iter().all(Listing::is_public));
    }
}
