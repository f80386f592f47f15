//! Seat binding shared by redemption and switching.

use tracing::{debug, warn};

use seatbroker_core::result::AppResult;
use seatbroker_core::types::CodeId;
use seatbroker_database::HoldOutcome;
use seatbroker_entity::{CodeBinding, MotherAccount};

use super::ledger::CodeLedger;
use super::outcome::BindResult;

/// Hold attempts per mother before moving on; each retry follows a lost race.
const HOLD_ATTEMPTS: usize = 3;

impl CodeLedger {
    /// Find a seat on a healthy mother, hold it, send the invite and commit.
    ///
    /// Mothers whose team is in `prefer_teams` are tried first; the order
    /// never removes a candidate. A 401/403 invalidates the mother and moves
    /// on; retryable failures release the hold and move on. Returns
    /// [`BindResult::NoSeat`] when every candidate is exhausted.
    pub async fn bind_seat(
        &self,
        code_id: Option<CodeId>,
        email: &str,
        prefer_teams: &[String],
    ) -> AppResult<BindResult> {
        let mut mothers = self.allocator.healthy_mothers().await?;
        mothers.sort_by_key(|m| !prefer_teams.contains(&m.team_id));

        for mother in &mothers {
            if let Some(binding) = self.bind_on_mother(mother, code_id, email).await? {
                return Ok(BindResult::Bound(binding));
            }
        }
        debug!(email = %email, candidates = mothers.len(), "No seat available on any mother");
        Ok(BindResult::NoSeat)
    }

    async fn bind_on_mother(
        &self,
        mother: &MotherAccount,
        code_id: Option<CodeId>,
        email: &str,
    ) -> AppResult<Option<CodeBinding>> {
        for _ in 0..HOLD_ATTEMPTS {
            let Some(seat) = self.allocator.find_free_seat(mother.id).await? else {
                return Ok(None);
            };
            let held = match self
                .allocator
                .hold(&seat, &mother.team_id, email, code_id)
                .await?
            {
                HoldOutcome::Held(held) => held,
                HoldOutcome::Unavailable => continue,
                HoldOutcome::AlreadyAssigned => return Ok(None),
            };

            return match self.gateway.send_invite(mother, email).await {
                Ok(receipt) => {
                    let committed = self
                        .allocator
                        .commit(
                            held.id,
                            receipt.invite_id.as_deref(),
                            receipt.member_id.as_deref(),
                        )
                        .await?;
                    if !committed {
                        warn!(mother_id = %mother.id, seat_id = %held.id, "Invite sent but hold expired before commit");
                        if let Err(err) = self
                            .withdraw_remote(mother, email, receipt.member_id.as_deref())
                            .await
                        {
                            warn!(mother_id = %mother.id, email = %email, error = %err, "Failed to withdraw orphaned invite");
                        }
                        return Ok(None);
                    }
                    Ok(Some(CodeBinding {
                        seat_id: held.id,
                        mother_id: mother.id,
                        team_id: mother.team_id.clone(),
                        email: email.to_string(),
                        invite_id: receipt.invite_id,
                    }))
                }
                Err(err) if err.is_account_invalid() => {
                    warn!(mother_id = %mother.id, error = %err, "Mother rejected credentials during invite");
                    self.allocator.invalidate_mother(mother.id).await?;
                    Ok(None)
                }
                Err(err) if err.is_retryable() || err.is_circuit_open() => {
                    warn!(mother_id = %mother.id, error = %err, "Invite failed, trying next mother");
                    self.allocator.release(held.id).await?;
                    Ok(None)
                }
                Err(err) => {
                    self.allocator.release(held.id).await?;
                    Err(err.into())
                }
            };
        }
        Ok(None)
    }

    /// Undo a remote membership, or the pending invite when no member id is
    /// known. Nothing to undo and unsupported operations count as done; a
    /// 401/403 invalidates the mother, whose seats are then freed locally.
    pub(crate) async fn withdraw_remote(
        &self,
        mother: &MotherAccount,
        email: &str,
        member_id: Option<&str>,
    ) -> AppResult<()> {
        let removed = match member_id {
            Some(member_id) => self.gateway.remove_member(mother, member_id).await,
            None => self.gateway.cancel_invite(mother, email).await,
        };
        match removed {
            Ok(()) => Ok(()),
            Err(err) if err.is_unsupported() || err.status == Some(404) => {
                debug!(mother_id = %mother.id, error = %err, "Nothing to withdraw remotely");
                Ok(())
            }
            Err(err) if err.is_account_invalid() => {
                self.allocator.invalidate_mother(mother.id).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Give back a seat that was bound but never recorded on a code: withdraw
    /// the invite, then free the seat.
    pub(crate) async fn abandon_binding(&self, binding: &CodeBinding) -> AppResult<()> {
        let seat = self
            .allocator
            .find_active(&binding.team_id, &binding.email)
            .await?
            .filter(|seat| seat.id == binding.seat_id);
        if let Some(mother) = self.allocator.mother(binding.mother_id).await? {
            let member_id = seat.as_ref().and_then(|s| s.member_id.as_deref());
            if let Err(err) = self.withdraw_remote(&mother, &binding.email, member_id).await {
                warn!(mother_id = %mother.id, seat_id = %binding.seat_id, error = %err, "Failed to withdraw abandoned invite");
            }
        }
        self.allocator.release(binding.seat_id).await?;
        debug!(seat_id = %binding.seat_id, "Abandoned unrecorded binding");
        Ok(())
    }
}
