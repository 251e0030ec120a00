//! Resource types returned by the gateway.
//!
//! # Design
//! Each resource is a newtype over `Record`. Field access goes through the
//! record (via `Deref`), so fields the server adds later are reachable
//! without a client release. The newtypes exist for the operations: a
//! `Charge` can be captured, a `Transfer` cancelled, and so on.
//!
//! Operations that change the same logical entity (capture, void, sign,
//! cancel, save) replace the record in place. Operations that create a new
//! entity (refund, charge from an account) return it.

use std::ops::{Deref, DerefMut};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::amount::Amount;
use crate::client::DEFAULT_SIGNATURE_FORMAT;
use crate::collection::Collection;
use crate::error::Result;
use crate::params::{to_params, Params};
use crate::record::{nested, Record, Resource};

macro_rules! resource {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize)]
        #[serde(transparent)]
        pub struct $name(Record);

        impl Resource for $name {
            const NAME: &'static str = $label;

            fn from_record(record: Record) -> Self {
                Self(record)
            }

            fn record(&self) -> &Record {
                &self.0
            }

            fn record_mut(&mut self) -> &mut Record {
                &mut self.0
            }

            fn into_record(self) -> Record {
                self.0
            }
        }

        impl Deref for $name {
            type Target = Record;

            fn deref(&self) -> &Record {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Record {
                &mut self.0
            }
        }

        /// Same entity: same type and same id.
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.same_entity(&other.0)
            }
        }
    };
}

resource!(
    /// The merchant owning the credentials.
    Merchant,
    "merchant"
);
resource!(
    /// A card merchant account.
    Account,
    "account"
);
resource!(
    /// A merchant bank account used for ACH transfers.
    BankAccount,
    "bank account"
);
resource!(
    /// A merchant ACH account used to accept bank payments.
    AchAccount,
    "ach account"
);
resource!(
    /// One-time payment token.
    Token,
    "token"
);
resource!(
    /// A saved card.
    Card,
    "card"
);
resource!(
    /// A saved bank.
    Bank,
    "bank"
);
resource!(
    /// A card or bank charge, possibly only authorized.
    Charge,
    "charge"
);
resource!(
    /// A refund against a charge.
    Refund,
    "refund"
);
resource!(
    /// A standalone credit to a payment method.
    Credit,
    "credit"
);
resource!(
    /// Any transaction kind, as returned by the transactions listing.
    Transaction,
    "transaction"
);
resource!(
    /// An ACH transfer into or out of a bank account.
    Transfer,
    "transfer"
);
resource!(
    /// A signature captured for a transaction.
    Signature,
    "signature"
);
resource!(
    /// A notification of something that happened on the account.
    Event,
    "event"
);

/// Caller params with one extra key set.
fn with_param(params: impl Serialize, key: &str, value: impl Into<Value>) -> Result<Params> {
    let mut params = to_params(params)?;
    params.insert(key.to_string(), value.into());
    Ok(params)
}

fn is_primary(record: &Record) -> bool {
    record.get::<bool>("primary").unwrap_or(false)
}

fn void_in_place(record: &mut Record, params: impl Serialize) -> Result<()> {
    let id = record.require_id()?;
    let updated = record.gateway().void(&id, params)?;
    record.replace(updated.into_record());
    Ok(())
}

fn sign_in_place(
    record: &mut Record,
    data: &str,
    gratuity: Option<&dyn Amount>,
    format: Option<&str>,
    params: impl Serialize,
) -> Result<()> {
    let id = record.require_id()?;
    let format = format.unwrap_or(DEFAULT_SIGNATURE_FORMAT);
    let updated = record
        .gateway()
        .sign(&id, data, gratuity, format, params)?;
    record.replace(updated.into_record());
    Ok(())
}

impl Merchant {
    fn nested_accounts<R: Resource>(&self, key: &str) -> Vec<R> {
        let extra: Vec<(&str, Value)> = match self.value("id") {
            Some(id) if !id.is_null() => vec![("merchant_id", id.clone())],
            _ => Vec::new(),
        };
        nested(self.value(key), self.gateway(), &extra)
    }

    pub fn all_accounts(&self) -> Vec<Account> {
        self.nested_accounts("accounts")
    }

    pub fn primary_account(&self) -> Option<Account> {
        self.all_accounts().into_iter().find(Account::is_primary)
    }

    pub fn all_bank_accounts(&self) -> Vec<BankAccount> {
        self.nested_accounts("bank_accounts")
    }

    pub fn primary_bank_account(&self) -> Option<BankAccount> {
        self.all_bank_accounts()
            .into_iter()
            .find(BankAccount::is_primary)
    }

    pub fn all_ach_accounts(&self) -> Vec<AchAccount> {
        self.nested_accounts("ach_accounts")
    }

    pub fn primary_ach_account(&self) -> Option<AchAccount> {
        self.all_ach_accounts()
            .into_iter()
            .find(AchAccount::is_primary)
    }

    pub fn charges(&self, params: impl Serialize) -> Result<Collection<Charge>> {
        self.gateway().charges(params)
    }

    pub fn transfers(&self, params: impl Serialize) -> Result<Collection<Transfer>> {
        self.gateway().transfers(params)
    }

    /// Send the current attributes and take over the server's answer.
    pub fn save(&mut self) -> Result<()> {
        let updated = self.gateway().update_merchant(self.writable_attributes())?;
        self.replace(updated.into_record());
        Ok(())
    }
}

impl Account {
    pub fn is_primary(&self) -> bool {
        is_primary(self)
    }

    pub fn authorize(&self, amount: impl Amount, params: impl Serialize) -> Result<Charge> {
        let params = with_param(params, "account_id", self.require_id()?)?;
        self.gateway().authorize(amount, params)
    }

    pub fn charge(&self, amount: impl Amount, params: impl Serialize) -> Result<Charge> {
        let params = with_param(params, "account_id", self.require_id()?)?;
        self.gateway().charge(amount, params)
    }

    pub fn charges(&self, params: impl Serialize) -> Result<Collection<Charge>> {
        let params = with_param(params, "account_id", self.require_id()?)?;
        self.gateway().charges(params)
    }

    pub fn save(&mut self) -> Result<()> {
        let id = self.require_id()?;
        let updated = self.gateway().update_account(&id, self.writable_attributes())?;
        self.replace(updated.into_record());
        Ok(())
    }
}

impl BankAccount {
    pub fn is_primary(&self) -> bool {
        is_primary(self)
    }

    /// The merchant owning this account.
    pub fn merchant(&self) -> Result<Merchant> {
        self.gateway().merchant(())
    }

    /// Pull funds from the payment method into this account.
    pub fn debit(&self, amount: impl Amount, params: impl Serialize) -> Result<Transfer> {
        self.transfer_of_type("DEBIT", amount, params)
    }

    /// Push funds from this account to the payment method.
    pub fn credit(&self, amount: impl Amount, params: impl Serialize) -> Result<Transfer> {
        self.transfer_of_type("CREDIT", amount, params)
    }

    fn transfer_of_type(
        &self,
        kind: &str,
        amount: impl Amount,
        params: impl Serialize,
    ) -> Result<Transfer> {
        let mut params = with_param(params, "account_id", self.require_id()?)?;
        params.insert("type".into(), Value::from(kind));
        self.gateway().transfer(amount, params)
    }

    pub fn transfers(&self, params: impl Serialize) -> Result<Collection<Transfer>> {
        let params = with_param(params, "account_id", self.require_id()?)?;
        self.gateway().transfers(params)
    }

    pub fn save(&mut self) -> Result<()> {
        let id = self.require_id()?;
        let updated = self
            .gateway()
            .update_bank_account(&id, self.writable_attributes())?;
        self.replace(updated.into_record());
        Ok(())
    }
}

impl AchAccount {
    pub fn is_primary(&self) -> bool {
        is_primary(self)
    }

    pub fn merchant(&self) -> Result<Merchant> {
        self.gateway().merchant(())
    }

    pub fn charge(&self, amount: impl Amount, params: impl Serialize) -> Result<Charge> {
        let params = with_param(params, "account_id", self.require_id()?)?;
        self.gateway().charge(amount, params)
    }

    pub fn transfer(&self, amount: impl Amount, params: impl Serialize) -> Result<Transfer> {
        let params = with_param(params, "account_id", self.require_id()?)?;
        self.gateway().transfer(amount, params)
    }

    pub fn transactions(&self, params: impl Serialize) -> Result<Collection<Transaction>> {
        let params = with_param(params, "account_id", self.require_id()?)?;
        self.gateway().transactions(params)
    }

    pub fn save(&mut self) -> Result<()> {
        let id = self.require_id()?;
        let updated = self
            .gateway()
            .update_ach_account(&id, self.writable_attributes())?;
        self.replace(updated.into_record());
        Ok(())
    }
}

impl Charge {
    pub fn auto_capture(&self) -> Option<bool> {
        self.get("auto_capture")
    }

    pub fn amount_refunded(&self) -> i64 {
        self.get("amount_refunded").unwrap_or(0)
    }

    pub fn is_refunded(&self) -> bool {
        self.get::<bool>("refunded")
            .unwrap_or_else(|| self.amount_refunded() > 0)
    }

    /// The tokenized payment method (`number`, `fingerprint`, ...).
    pub fn payment_method(&self) -> Option<&Map<String, Value>> {
        self.object("method")
    }

    /// Refunds embedded in the charge.
    pub fn refunds(&self) -> Vec<Refund> {
        nested(self.value("refunds"), self.gateway(), &[])
    }

    pub fn capture(&mut self, amount: impl Amount, params: impl Serialize) -> Result<()> {
        let id = self.require_id()?;
        let updated = self.gateway().capture(&id, amount, params)?;
        self.replace(updated.into_record());
        Ok(())
    }

    pub fn void(&mut self, params: impl Serialize) -> Result<()> {
        void_in_place(self, params)
    }

    /// Refund (or, with a `method` param, credit) part of this charge. The
    /// charge itself is not refreshed.
    pub fn refund(&self, amount: impl Amount, params: impl Serialize) -> Result<Refund> {
        self.gateway().refund(&self.require_id()?, amount, params)
    }

    /// Attach a signature. `format` defaults to `JSIGNATURE_NATIVE`.
    pub fn sign(
        &mut self,
        data: &str,
        gratuity: Option<&dyn Amount>,
        format: Option<&str>,
        params: impl Serialize,
    ) -> Result<()> {
        sign_in_place(self, data, gratuity, format, params)
    }
}

impl Transaction {
    pub fn void(&mut self, params: impl Serialize) -> Result<()> {
        void_in_place(self, params)
    }

    pub fn sign(
        &mut self,
        data: &str,
        gratuity: Option<&dyn Amount>,
        format: Option<&str>,
        params: impl Serialize,
    ) -> Result<()> {
        sign_in_place(self, data, gratuity, format, params)
    }
}

impl Refund {
    pub fn payment_method(&self) -> Option<&Map<String, Value>> {
        self.object("method")
    }
}

impl Credit {
    pub fn payment_method(&self) -> Option<&Map<String, Value>> {
        self.object("method")
    }
}

impl Card {
    /// `None` when the server answers 204.
    pub fn delete(&self) -> Result<Option<Card>> {
        self.gateway().delete_card(&self.require_id()?)
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.get("fingerprint")
    }
}

impl Bank {
    pub fn delete(&self) -> Result<Option<Bank>> {
        self.gateway().delete_bank(&self.require_id()?)
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.get("fingerprint")
    }
}

impl Transfer {
    pub fn payment_method(&self) -> Option<&Map<String, Value>> {
        self.object("method")
    }

    pub fn cancel(&mut self, params: impl Serialize) -> Result<()> {
        let id = self.require_id()?;
        let updated = self.gateway().cancel_transfer(&id, params)?;
        self.replace(updated.into_record());
        Ok(())
    }
}

impl Event {
    /// Dotted event name such as `charge.created`.
    pub fn event_type(&self) -> Option<String> {
        self.type_name()
    }

    pub fn data(&self) -> Option<&Value> {
        self.value("data")
    }
}
