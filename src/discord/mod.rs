// src/discord/mod.rs
//! Adapter zdarzeń Discorda -> trackery.
//! Nic tu nie egzekwujemy (mute/ban) – tylko tłumaczymy eventy i logujemy wyniki.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::fingerprint::{message_points, MessageTraits};
use crate::invites::{Attribution, InviteAttributor, ObservedInvite};
use crate::spam::SpamScorer;
use crate::AppContext;

pub struct Handler {
    pub app: Arc<AppContext>,
    pub invites: Arc<InviteAttributor>,
    pub spam: Arc<SpamScorer>,
}

/// Handler nie może wywrócić pętli eventów serenity.
async fn guarded<F>(name: &'static str, fut: F)
where
    F: Future<Output = ()>,
{
    if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
        tracing::error!(handler = name, "event handler panicked");
    }
}

fn observed_invite(code: &str, uses: u64, inviter: Option<&User>) -> ObservedInvite {
    ObservedInvite {
        code: code.to_string(),
        use_count: uses,
        inviter_id: inviter.map(|u| u.id.get()),
    }
}

fn observed_from_rich(inv: &RichInvite) -> ObservedInvite {
    observed_invite(&inv.code, inv.uses, inv.inviter.as_ref())
}

async fn fetch_invites(ctx: &Context, guild_id: GuildId) -> Result<Vec<ObservedInvite>> {
    let list = guild_id.invites(&ctx.http).await?;
    Ok(list.iter().map(observed_from_rich).collect())
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(guilds = ready.guilds.len(), "Logged in as {}", ready.user.name);
    }

    // _is_new zgodnie z Serenity 0.12
    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        guarded("guild_create", async {
            let gid = guild.id.get();
            match fetch_invites(&ctx, guild.id).await {
                Ok(list) => {
                    let n = self.invites.seed(&list);
                    tracing::info!(guild=%guild.name, gid, seeded = n, "invite snapshot warmed");
                }
                // brak MANAGE_GUILD => atrybucja w tej gildii będzie zawsze Unknown
                Err(e) => tracing::warn!(error=?e, gid, "fetch invites failed (guild_create)"),
            }
        })
        .await;
    }

    async fn invite_create(&self, _ctx: Context, data: InviteCreateEvent) {
        guarded("invite_create", async {
            let observed = observed_invite(&data.code, data.uses, data.inviter.as_ref());
            if let Err(e) = self.invites.record_invite(&observed) {
                tracing::warn!(error=%e, code=%data.code, "record_invite rejected");
            }
        })
        .await;
    }

    async fn invite_delete(&self, _ctx: Context, data: InviteDeleteEvent) {
        guarded("invite_delete", async {
            self.invites.forget_invite(&data.code);
        })
        .await;
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        guarded("guild_member_addition", async {
            let gid = member.guild_id.get();
            let uid = member.user.id.get();

            let observed = match fetch_invites(&ctx, member.guild_id).await {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(error=?e, gid, uid, "fetch invites failed (member join)");
                    return;
                }
            };

            match self.invites.attribute_join(&observed) {
                Attribution::Invite(inv) => tracing::info!(
                    gid,
                    uid,
                    code = %inv.code,
                    inviter = ?inv.inviter_id,
                    uses = inv.use_count,
                    "JOIN attributed"
                ),
                Attribution::Unknown => {
                    tracing::info!(gid, uid, "JOIN attribution unknown (vanity/oauth?)")
                }
            }
        })
        .await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let Some(gid) = msg.guild_id else {
            return;
        };
        if msg.author.bot {
            return;
        }

        guarded("message", async {
            let traits = MessageTraits::from_parts(
                &msg.content,
                msg.mentions.len() as u32,
                msg.attachments.len() as u32,
                msg.mention_everyone,
            );
            let points = message_points(&self.app.settings.scoring, &traits);

            match self
                .spam
                .check_spam(msg.author.id.get(), gid.get(), traits.fingerprint, points)
            {
                Ok(v) if v.over_threshold => tracing::warn!(
                    gid = gid.get(),
                    uid = msg.author.id.get(),
                    channel = msg.channel_id.get(),
                    total = v.point_total,
                    repeated = v.repeated,
                    "SPAM over threshold"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error=%e, gid = gid.get(), "check_spam rejected"),
            }
        })
        .await;
    }
}

pub fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "GUILD_INVITES" => i |= GatewayIntents::GUILD_INVITES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            other => tracing::warn!(intent = other, "unknown gateway intent ignored"),
        }
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (TSS_DISCORD_TOKEN). Uzupełnij w .env.");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents);

    let handler = Handler {
        app: ctx.clone(),
        invites: ctx.invites(),
        spam: ctx.spam(),
    };

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}
