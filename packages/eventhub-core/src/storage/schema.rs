//! # Database Schema
//!
//! SQL schema definitions for the EventHub database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐   ┌───────────────────┐   ┌──────────────────┐    │
//! │  │  organizations   │◄──│ community_members │   │      users       │    │
//! │  ├──────────────────┤   ├───────────────────┤   ├──────────────────┤    │
//! │  │ id, slug         │   │ community_id      │   │ id, email        │    │
//! │  │ owner_user_id    │   │ user_id, role     │   │ luma_email       │    │
//! │  │ is_verified      │   └───────────────────┘   └──────────────────┘    │
//! │  └────────▲─────────┘                                                   │
//! │           │ (SET NULL)                                                  │
//! │  ┌────────┴─────────┐   ┌───────────────────┐   ┌──────────────────┐    │
//! │  │      events      │◄──│ sponsors/winners  │   │     claims       │    │
//! │  ├──────────────────┤   │ event_hosts       │   ├──────────────────┤    │
//! │  │ approval         │   │  (CASCADE)        │   │ kind, token      │    │
//! │  │ organization_id  │   └───────────────────┘   │ status           │    │
//! │  └──────────────────┘                           └──────────────────┘    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌───────────────────┐   ┌──────────────────┐    │
//! │  │ badges           │   │ generation_outbox │   │  subscriptions   │    │
//! │  │ gift_cards       │◄──│ (pending jobs)    │   │                  │    │
//! │  └──────────────────┘   └───────────────────┘   └──────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Cached identity-provider profiles plus the Luma account link
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT,
    email_verified INTEGER NOT NULL DEFAULT 0,
    display_name TEXT,
    avatar_url TEXT,
    luma_email TEXT,
    luma_verified INTEGER NOT NULL DEFAULT 0,
    luma_verify_token TEXT UNIQUE,
    updated_at INTEGER NOT NULL
);

-- Communities (organizations)
CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    logo_url TEXT,
    owner_user_id TEXT NOT NULL,
    is_verified INTEGER NOT NULL DEFAULT 0,
    is_personal_org INTEGER NOT NULL DEFAULT 0,
    org_type TEXT NOT NULL DEFAULT 'community',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_organizations_verified ON organizations(is_verified);

-- One row per (community, user)
CREATE TABLE IF NOT EXISTS community_members (
    community_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('owner', 'admin', 'member', 'follower')),
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (community_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_members_user ON community_members(user_id);

-- Events; approval is the only visibility flag
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    short_code TEXT NOT NULL UNIQUE,
    organization_id TEXT REFERENCES organizations(id) ON DELETE SET NULL,
    title TEXT NOT NULL,
    description TEXT,
    event_type TEXT NOT NULL DEFAULT 'other',
    format TEXT NOT NULL DEFAULT 'in_person',
    city TEXT,
    venue TEXT,
    url TEXT,
    cover_url TEXT,
    starts_at INTEGER NOT NULL,
    ends_at INTEGER NOT NULL,
    registration_opens_at INTEGER,
    registration_closes_at INTEGER,
    approval TEXT NOT NULL DEFAULT 'pending' CHECK (approval IN ('pending', 'approved', 'rejected')),
    source TEXT NOT NULL DEFAULT 'manual',
    external_id TEXT UNIQUE,
    submitted_by TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_feed ON events(approval, starts_at, id);
CREATE INDEX IF NOT EXISTS idx_events_org ON events(organization_id);

CREATE TABLE IF NOT EXISTS event_sponsors (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    logo_url TEXT,
    tier TEXT,
    position INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS event_winners (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    team_name TEXT NOT NULL,
    project_name TEXT,
    prize TEXT,
    position INTEGER NOT NULL DEFAULT 0
);

-- External host identities attached to imported events
CREATE TABLE IF NOT EXISTS event_hosts (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    email TEXT,
    avatar_url TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0,
    organization_id TEXT REFERENCES organizations(id) ON DELETE SET NULL,
    match_score INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_event_hosts_event ON event_hosts(event_id);

-- Host (e-mail verified) and organizer (admin reviewed) claims
CREATE TABLE IF NOT EXISTS claims (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('host', 'organizer')),
    event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    host_id TEXT REFERENCES event_hosts(id) ON DELETE SET NULL,
    user_id TEXT NOT NULL,
    organization_id TEXT REFERENCES organizations(id) ON DELETE SET NULL,
    email TEXT,
    token TEXT UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),
    note TEXT,
    created_at INTEGER NOT NULL,
    resolved_at INTEGER
);

-- Generated community badges
CREATE TABLE IF NOT EXISTS badges (
    id TEXT PRIMARY KEY,
    token TEXT NOT NULL UNIQUE,
    community_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    badge_number INTEGER NOT NULL,
    member_name TEXT NOT NULL,
    member_role TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    job_handle TEXT,
    generated_image_url TEXT,
    generated_background_url TEXT,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (community_id, badge_number)
);

-- Generated gift cards
CREATE TABLE IF NOT EXISTS gift_cards (
    id TEXT PRIMARY KEY,
    token TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    recipient_name TEXT NOT NULL,
    message TEXT,
    style TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    job_handle TEXT,
    generated_image_url TEXT,
    generated_background_url TEXT,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Newsletter subscriptions
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    verify_token TEXT UNIQUE,
    unsubscribe_token TEXT NOT NULL UNIQUE,
    is_verified INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Migration from v1 to v2: transactional outbox for generation jobs
pub const MIGRATE_V1_TO_V2: &str = r#"
CREATE TABLE IF NOT EXISTS generation_outbox (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('badge', 'gift_card')),
    record_id TEXT NOT NULL,
    token TEXT NOT NULL,
    payload TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at INTEGER NOT NULL
);
"#;

/// Migration from v2 to v3: dispatch lease on outbox rows
pub const MIGRATE_V2_TO_V3: &str = r#"
ALTER TABLE generation_outbox ADD COLUMN claimed_until INTEGER NOT NULL DEFAULT 0;
"#;
