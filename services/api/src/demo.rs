use clap::Args;
use profile_directory::error::AppError;
use profile_directory::workflows::pipeline::{
    seed_listings, CategoryLinks, DirectoryError, DirectoryService, Listing, MemoryTable,
    Notifier, PrimaryStore, Submission, SubmissionPayload, TierAccessor, TierPolicy, TierRead,
    TierStore,
};
use std::sync::Arc;

const BIO_SENTENCE: &str = "Partners with engineering leaders to build balanced teams, \
    runs structured interviews, and keeps candidates informed at every stage of the search.";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Display name used for the demo submission.
    #[arg(long, default_value = "Jordan Ellis")]
    pub(crate) name: String,
    /// Skip the initial reconcile, leaving the primary store empty until first read.
    #[arg(long)]
    pub(crate) skip_reconcile: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        name,
        skip_reconcile,
    } = args;

    let store = Arc::new(PrimaryStore::in_memory().await?);
    let service = demo_service(store.clone());

    println!("Profile directory demo");

    if !skip_reconcile {
        let report = service.reconcile().await?;
        println!(
            "\nReconcile: {} -> {} listings",
            report.before.count, report.after.count
        );
        for action in &report.actions {
            println!("  - {action}");
        }
    }

    println!("\nIntake");
    let mut short = demo_payload(&name);
    short.bio = Some(BIO_SENTENCE.to_string());
    match service.submit(short).await {
        Err(DirectoryError::Validation(err)) => {
            for issue in &err.issues {
                println!("  rejected {}: {}", issue.field, issue.message);
            }
        }
        Ok(submission) => println!("  unexpectedly accepted {}", submission.id.0),
        Err(err) => println!("  intake failed: {err}"),
    }

    let submission = match service.submit(demo_payload(&name)).await {
        Ok(submission) => submission,
        Err(err) => {
            println!("  intake failed: {err}");
            store.close().await;
            return Ok(());
        }
    };
    println!(
        "  accepted {} as '{}' ({})",
        submission.id.0,
        submission.slug,
        submission.status.label()
    );

    println!("\nModeration");
    match service.approve(&submission.id).await {
        Ok(approval) => println!(
            "  approved {} -> listing {} at /{}",
            approval.submission_id.0, approval.listing_id.0, approval.slug
        ),
        Err(err) => println!("  approval failed: {err}"),
    }

    let duplicate = match service.submit(demo_payload(&name)).await {
        Ok(submission) => Some(submission),
        Err(err) => {
            println!("  second intake failed: {err}");
            None
        }
    };
    if let Some(duplicate) = duplicate {
        match service.approve(&duplicate.id).await {
            Err(DirectoryError::DuplicateSlug { slug }) => {
                println!("  second approval held: slug '{slug}' is already published");
                if let Ok(held) = service.get(&duplicate.id).await {
                    println!("  {} remains {}", held.id.0, held.status.label());
                }
            }
            Ok(approval) => println!("  second approval published {}", approval.listing_id.0),
            Err(err) => println!("  second approval failed: {err}"),
        }
    }

    println!("\nPublished directory");
    match service.public_listings().await {
        Ok(read) => render_listings(&read),
        Err(err) => println!("  listings unavailable: {err}"),
    }

    store.close().await;
    Ok(())
}

fn demo_service(store: Arc<PrimaryStore>) -> DirectoryService {
    let submissions =
        TierAccessor::new(Arc::new(MemoryTable::<Submission>::new()), TierPolicy::degrade())
            .with_primary(store.clone() as Arc<dyn TierStore<Submission>>);
    let listings = TierAccessor::new(
        Arc::new(MemoryTable::with_seed(seed_listings())),
        TierPolicy::degrade(),
    )
    .with_primary(store.clone() as Arc<dyn TierStore<Listing>>)
    .with_seed(seed_listings());

    DirectoryService::new(
        Arc::new(submissions),
        Arc::new(listings),
        store as Arc<dyn CategoryLinks>,
        Notifier::disabled(),
    )
}

fn demo_payload(name: &str) -> SubmissionPayload {
    SubmissionPayload {
        display_name: Some(name.to_string()),
        email: Some("jordan.ellis@northwind-talent.com".to_string()),
        company: Some("Northwind Talent".to_string()),
        job_title: Some("Principal Recruiter".to_string()),
        location: Some("Chicago, IL".to_string()),
        bio: Some(vec![BIO_SENTENCE; 12].join(" ")),
        years_experience: Some(9),
        specializations: vec!["Platform Engineering".to_string(), "Data".to_string()],
        industries: vec!["Fintech".to_string()],
        languages: vec!["English".to_string(), "Spanish".to_string()],
        ..SubmissionPayload::default()
    }
}

fn render_listings(read: &TierRead<Vec<Listing>>) {
    let source = if read.degraded() {
        format!("{} (degraded)", read.tier)
    } else {
        read.tier.to_string()
    };
    println!("  {} listings served from {source}", read.data.len());
    for listing in &read.data {
        let marker = if listing.featured { "*" } else { " " };
        println!(
            "  {marker} {:<24} {:<20} {}",
            listing.profile.display_name, listing.slug, listing.profile.company
        );
    }
}
