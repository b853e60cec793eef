//! # Gift Cards
//!
//! Issue, reload, look up and deactivate stored-value cards. Redemption and
//! credit-back happen inside payments and reversals.

use chrono::Utc;
use tracing::{debug, info};

use nautilus_core::validation::{validate_card_number, validate_positive_amount};
use nautilus_core::{GiftCard, GiftCardActivity, GiftCardActivityKind, GiftCardStatus, Money};
use nautilus_db::commit;
use nautilus_db::repository::{gift_card, transaction as txn_store};

use super::Ledger;
use crate::error::{LedgerError, LedgerResult};

impl Ledger {
    /// Issues a new card loaded with `initial_balance`.
    pub async fn issue_gift_card(
        &self,
        customer_id: Option<String>,
        initial_balance: Money,
    ) -> LedgerResult<GiftCard> {
        validate_positive_amount("initial_balance", initial_balance)?;

        let now = Utc::now();
        let card = GiftCard {
            id: txn_store::generate_id(),
            card_number: gift_card::generate_card_number(),
            customer_id: customer_id
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            initial_balance_cents: initial_balance.cents(),
            current_balance_cents: initial_balance.cents(),
            status: GiftCardStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;
        gift_card::insert(&mut tx, &card).await?;
        commit(tx).await?;
        drop(guard);

        info!(gift_card_id = %card.id, balance = %initial_balance, "Gift card issued");
        Ok(card)
    }

    /// Adds `amount` to a card, reactivating it if needed.
    pub async fn reload_gift_card(&self, gift_card_id: &str, amount: Money) -> LedgerResult<GiftCard> {
        validate_positive_amount("amount", amount)?;

        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let activity = gift_card::adjust_balance(
            &mut tx,
            gift_card_id,
            GiftCardActivityKind::Reload,
            amount.cents(),
            None,
            Utc::now(),
        )
        .await?
        .ok_or_else(|| LedgerError::not_found("Gift card", gift_card_id))?;

        let card = gift_card::fetch(&mut tx, gift_card_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Gift card", gift_card_id))?;

        commit(tx).await?;
        drop(guard);

        info!(
            gift_card_id = %gift_card_id,
            amount = %amount,
            balance = activity.balance_after_cents,
            "Gift card reloaded"
        );
        Ok(card)
    }

    /// Stops a card from being redeemed. Credits from voids and refunds are
    /// still accepted.
    pub async fn deactivate_gift_card(&self, gift_card_id: &str) -> LedgerResult<GiftCard> {
        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        if !gift_card::set_status(&mut tx, gift_card_id, GiftCardStatus::Inactive, Utc::now()).await? {
            return Err(LedgerError::not_found("Gift card", gift_card_id));
        }
        let card = gift_card::fetch(&mut tx, gift_card_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Gift card", gift_card_id))?;

        commit(tx).await?;
        drop(guard);

        info!(gift_card_id = %gift_card_id, "Gift card deactivated");
        Ok(card)
    }

    pub async fn get_gift_card(&self, gift_card_id: &str) -> LedgerResult<GiftCard> {
        self.db
            .gift_cards()
            .get_by_id(gift_card_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Gift card", gift_card_id))
    }

    /// Looks a card up by the number printed on it.
    pub async fn gift_card_by_number(&self, card_number: &str) -> LedgerResult<GiftCard> {
        validate_card_number(card_number)?;
        let card_number = card_number.trim();

        debug!(card_number = %card_number, "gift_card_by_number");
        self.db
            .gift_cards()
            .get_by_number(card_number)
            .await?
            .ok_or_else(|| LedgerError::not_found("Gift card", card_number))
    }

    /// Balance movements on a card, oldest first.
    pub async fn gift_card_activity(&self, gift_card_id: &str) -> LedgerResult<Vec<GiftCardActivity>> {
        self.get_gift_card(gift_card_id).await?;
        Ok(self.db.gift_cards().activity(gift_card_id).await?)
    }
}
