//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Dentists {
    Table,
    Id,
    Email,
    PasswordHash,
    PasswordSalt,
    FirstName,
    LastName,
    Phone,
    EmailVerified,
    SubscriptionStatus,
    SubscriptionExpiresAt,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum RefreshTokens {
    Table,
    Id,
    DentistId,
    TokenHash,
    ExpiresAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum EmailTokens {
    Table,
    Id,
    DentistId,
    Purpose,
    TokenHash,
    ExpiresAt,
    UsedAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum Patients {
    Table,
    Id,
    DentistId,
    FirstName,
    LastName,
    BirthDate,
    Gender,
    Phone,
    Email,
    Address,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Teeth {
    Table,
    Number,
    Dentition,
    Name,
}

#[derive(Iden)]
pub enum PatientTeeth {
    Table,
    Id,
    PatientId,
    ToothNumber,
    Condition,
    Notes,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Appointments {
    Table,
    Id,
    DentistId,
    PatientId,
    StartsAt,
    EndsAt,
    Status,
    Reason,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Treatments {
    Table,
    Id,
    DentistId,
    Name,
    Description,
    PriceCents,
    CreatedAt,
}

#[derive(Iden)]
pub enum Medicines {
    Table,
    Id,
    DentistId,
    Name,
    Dosage,
    Description,
    CreatedAt,
}

#[derive(Iden)]
pub enum ToothTreatments {
    Table,
    Id,
    AppointmentId,
    PatientToothId,
    TreatmentId,
    MedicineId,
    Notes,
    PriceCents,
    CreatedAt,
}

#[derive(Iden)]
pub enum Payments {
    Table,
    Id,
    DentistId,
    Provider,
    Reference,
    AmountCents,
    Currency,
    CapturedAt,
}

#[derive(Iden)]
pub enum ContactMessages {
    Table,
    Id,
    Name,
    Email,
    Subject,
    Message,
    AttachmentName,
    AttachmentPath,
    CreatedAt,
}
